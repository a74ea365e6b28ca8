mod bundle;
mod common;
mod extract;
