use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::io;


/// A enum providing a rough classification of errors.
///
/// The variants of this type partly resemble the stages of the
/// extraction pipeline, so that callers can tell apart a broken
/// container from broken metadata without parsing error messages.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The input could not be opened or mapped.
    Io,
    /// The object header or section header table is unreadable.
    HeaderInvalid,
    /// A required section is not present.
    SectionMissing,
    /// A global data symbol does not carry the descriptor suffix.
    MalformedDescriptorName,
    /// Kernels were found but the object has no note section.
    NoteSectionMissing,
    /// The note section does not contain the vendor marker.
    VendorMarkerNotFound,
    /// The note section does not contain the schema version key.
    SchemaVersionNotFound,
    /// An argument's value kind is not in the kind table.
    UnknownArgumentKind,
    /// The symbol and metadata passes disagree on the set of kernels.
    MetadataCountMismatch,
    /// Data ended before a declared or expected range.
    Truncated,
    /// A mandatory metadata field is absent from a kernel block.
    FieldMissing,
    /// A metadata field has an unexpected encoding or value.
    InvalidField,
    /// A configured resource limit was exceeded.
    LimitExceeded,
}

impl ErrorKind {
    /// Retrieve a textual representation of the error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Io => "I/O error",
            Self::HeaderInvalid => "invalid object header",
            Self::SectionMissing => "section missing",
            Self::MalformedDescriptorName => "malformed descriptor name",
            Self::NoteSectionMissing => "note section missing",
            Self::VendorMarkerNotFound => "vendor marker not found",
            Self::SchemaVersionNotFound => "schema version not found",
            Self::UnknownArgumentKind => "unknown argument kind",
            Self::MetadataCountMismatch => "metadata count mismatch",
            Self::Truncated => "truncated data",
            Self::FieldMissing => "metadata field missing",
            Self::InvalidField => "invalid metadata field",
            Self::LimitExceeded => "limit exceeded",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}


type Str = Cow<'static, str>;


enum ErrorImpl {
    Io(io::Error),
    Decode {
        kind: ErrorKind,
        detail: Str,
    },
    // Unfortunately, if we just had a single `Context` variant that
    // contains a `Cow`, this inner `Cow` would cause an overall enum
    // size increase by a machine word, because currently `rustc`
    // seemingly does not fold the necessary bits into the outer enum.
    ContextOwned {
        context: Box<String>,
        source: Box<ErrorImpl>,
    },
    ContextStatic {
        context: &'static str,
        source: Box<ErrorImpl>,
    },
}

impl ErrorImpl {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(..) => ErrorKind::Io,
            Self::Decode { kind, .. } => *kind,
            Self::ContextOwned { source, .. } | Self::ContextStatic { source, .. } => {
                source.kind()
            }
        }
    }

    fn detail(&self) -> Option<&str> {
        match self {
            Self::Io(..) => None,
            Self::Decode { detail, .. } if detail.is_empty() => None,
            Self::Decode { detail, .. } => Some(detail),
            Self::ContextOwned { source, .. } | Self::ContextStatic { source, .. } => {
                source.detail()
            }
        }
    }

    fn layer_is_context(&self) -> bool {
        matches!(self, Self::ContextOwned { .. } | Self::ContextStatic { .. })
    }

    fn fmt_layer(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Io(error) => Display::fmt(error, f),
            Self::Decode { kind, detail } => {
                if detail.is_empty() {
                    write!(f, "{kind}")
                } else {
                    write!(f, "{kind}: {detail}")
                }
            }
            Self::ContextOwned { context, .. } => f.write_str(context),
            Self::ContextStatic { context, .. } => f.write_str(context),
        }
    }

    fn source(&self) -> Option<&ErrorImpl> {
        match self {
            Self::Io(..) | Self::Decode { .. } => None,
            Self::ContextOwned { source, .. } | Self::ContextStatic { source, .. } => {
                Some(source)
            }
        }
    }
}


/// The error type used by the library.
///
/// Errors generally form a chain, with higher-level errors typically
/// providing additional context for lower level ones. E.g., a failure
/// to decode a packed integer may be wrapped by the name of the field
/// being read, which in turn is wrapped by the kernel being decoded.
///
/// The [`Display`] representation prints the outermost layer only,
/// the alternate representation (`{:#}`) the full chain.
pub struct Error {
    error: Box<ErrorImpl>,
}

impl Error {
    fn new(kind: ErrorKind, detail: impl Into<Str>) -> Self {
        Self {
            error: Box::new(ErrorImpl::Decode {
                kind,
                detail: detail.into(),
            }),
        }
    }

    #[inline]
    pub(crate) fn with_header_invalid(detail: impl Into<Str>) -> Self {
        Self::new(ErrorKind::HeaderInvalid, detail)
    }

    #[inline]
    pub(crate) fn with_section_missing(name: impl Into<Str>) -> Self {
        Self::new(ErrorKind::SectionMissing, name)
    }

    #[inline]
    pub(crate) fn with_malformed_descriptor_name(name: impl Into<Str>) -> Self {
        Self::new(ErrorKind::MalformedDescriptorName, name)
    }

    #[inline]
    pub(crate) fn with_note_section_missing() -> Self {
        Self::new(ErrorKind::NoteSectionMissing, "")
    }

    #[inline]
    pub(crate) fn with_vendor_marker_not_found(marker: impl Into<Str>) -> Self {
        Self::new(ErrorKind::VendorMarkerNotFound, marker)
    }

    #[inline]
    pub(crate) fn with_schema_version_not_found(marker: impl Into<Str>) -> Self {
        Self::new(ErrorKind::SchemaVersionNotFound, marker)
    }

    #[inline]
    pub(crate) fn with_unknown_argument_kind(text: impl Into<Str>) -> Self {
        Self::new(ErrorKind::UnknownArgumentKind, text)
    }

    #[inline]
    pub(crate) fn with_metadata_count_mismatch(detail: impl Into<Str>) -> Self {
        Self::new(ErrorKind::MetadataCountMismatch, detail)
    }

    #[inline]
    pub(crate) fn with_truncated(detail: impl Into<Str>) -> Self {
        Self::new(ErrorKind::Truncated, detail)
    }

    #[inline]
    pub(crate) fn with_field_missing(field: impl Into<Str>) -> Self {
        Self::new(ErrorKind::FieldMissing, field)
    }

    #[inline]
    pub(crate) fn with_invalid_field(detail: impl Into<Str>) -> Self {
        Self::new(ErrorKind::InvalidField, detail)
    }

    #[inline]
    pub(crate) fn with_limit_exceeded(detail: impl Into<Str>) -> Self {
        Self::new(ErrorKind::LimitExceeded, detail)
    }

    /// Retrieve a rough error classification in the form of an
    /// [`ErrorKind`].
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// Retrieve the offending item reported by the innermost error, if
    /// any.
    ///
    /// This is, for example, the unrecognized value kind text of an
    /// [`ErrorKind::UnknownArgumentKind`] error or the section name of
    /// an [`ErrorKind::SectionMissing`] one.
    #[inline]
    pub fn detail(&self) -> Option<&str> {
        self.error.detail()
    }

    fn layer_context(self, context: Str) -> Self {
        let context = match context {
            Cow::Borrowed(context) => ErrorImpl::ContextStatic {
                context,
                source: self.error,
            },
            Cow::Owned(context) => ErrorImpl::ContextOwned {
                context: Box::new(context),
                source: self.error,
            },
        };
        Self {
            error: Box::new(context),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut layer = Some(&*self.error);
        let mut first = true;
        while let Some(error) = layer {
            if !first {
                f.write_str("\n  caused by: ")?;
            }
            let () = error.fmt_layer(f)?;
            first = false;
            layer = error.source();
        }
        write!(f, " ({:?})", self.kind())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let () = self.error.fmt_layer(f)?;

        if f.alternate() {
            let mut layer = self.error.source();
            while let Some(error) = layer {
                f.write_str(": ")?;
                let () = error.fmt_layer(f)?;
                layer = error.source();
            }
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        let mut layer = &*self.error;
        while layer.layer_is_context() {
            // SANITY: Context layers always have a source.
            layer = layer.source().unwrap();
        }

        match layer {
            ErrorImpl::Io(error) => error.source(),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(other: io::Error) -> Self {
        Self {
            error: Box::new(ErrorImpl::Io(other)),
        }
    }
}


/// A trait providing ergonomic chaining capabilities to [`Error`].
pub trait ErrorExt: private::Sealed {
    /// The output type produced by [`context`](Self::context) and
    /// [`with_context`](Self::with_context).
    type Output;

    /// Add context to this error.
    // If we had specialization of sorts we could be more lenient as to
    // what we can accept, but for now this method always works with
    // static strings and nothing else.
    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr;

    /// Add context to this error, using a closure for lazy evaluation.
    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C;
}

impl ErrorExt for Error {
    type Output = Error;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr,
    {
        self.layer_context(context.into_cow_str())
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.layer_context(f().into_cow_str())
    }
}

impl<T, E> ErrorExt for Result<T, E>
where
    E: ErrorExt,
{
    type Output = Result<T, E::Output>;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr,
    {
        match self {
            Ok(val) => Ok(val),
            Err(err) => Err(err.context(context)),
        }
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        match self {
            Ok(val) => Ok(val),
            Err(err) => Err(err.with_context(f)),
        }
    }
}

impl ErrorExt for io::Error {
    type Output = Error;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr,
    {
        Error::from(self).context(context)
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        Error::from(self).with_context(f)
    }
}


/// A trait for types that can be converted into a `Cow<'static, str>`.
pub trait IntoCowStr {
    /// Perform the conversion.
    fn into_cow_str(self) -> Str;
}

impl IntoCowStr for &'static str {
    fn into_cow_str(self) -> Str {
        Cow::Borrowed(self)
    }
}

impl IntoCowStr for String {
    fn into_cow_str(self) -> Str {
        Cow::Owned(self)
    }
}


/// A trait providing conversion shortcuts for creating `Error`
/// instances from `Option`s.
pub(crate) trait IntoError<T>: private::Sealed
where
    Self: Sized,
{
    fn ok_or_error<C, F>(self, kind: ErrorKind, f: F) -> Result<T, Error>
    where
        C: IntoCowStr,
        F: FnOnce() -> C;

    #[inline]
    fn ok_or_truncated<C, F>(self, f: F) -> Result<T, Error>
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.ok_or_error(ErrorKind::Truncated, f)
    }

    #[inline]
    fn ok_or_header_invalid<C, F>(self, f: F) -> Result<T, Error>
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.ok_or_error(ErrorKind::HeaderInvalid, f)
    }

    #[inline]
    fn ok_or_invalid_field<C, F>(self, f: F) -> Result<T, Error>
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.ok_or_error(ErrorKind::InvalidField, f)
    }
}

impl<T> IntoError<T> for Option<T> {
    #[inline]
    fn ok_or_error<C, F>(self, kind: ErrorKind, f: F) -> Result<T, Error>
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::new(kind, f().into_cow_str()))
    }
}


// Private module to sealed the `ErrorExt` and `IntoError` traits.
mod private {
    use super::Error;
    use super::ErrorExt;

    pub trait Sealed {}

    impl Sealed for Error {}
    impl<T, E> Sealed for Result<T, E> where E: ErrorExt {}
    impl Sealed for std::io::Error {}
    impl<T> Sealed for Option<T> {}
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind as IoErrorKind;

    use test_log::test;


    /// Exercise the `Display` and `Debug` representation of various
    /// types.
    #[test]
    fn fmt() {
        let err = Error::with_unknown_argument_kind("hidden_heap_v1");
        assert_eq!(format!("{err}"), "unknown argument kind: hidden_heap_v1");

        let err = err.context("failed to decode argument 3");
        assert_eq!(format!("{err}"), "failed to decode argument 3");
        assert_eq!(
            format!("{err:#}"),
            "failed to decode argument 3: unknown argument kind: hidden_heap_v1"
        );
        assert_ne!(format!("{err:?}"), "");
        assert_eq!(format!("{}", ErrorKind::Truncated), "truncated data");
    }

    /// Check that the kind and detail of an error survive any number of
    /// context layers.
    #[test]
    fn kind_and_detail_through_context() {
        let err = Error::with_section_missing(".symtab")
            .context("failed to index object")
            .with_context(|| format!("failed to process {}", "foo.co"));
        assert_eq!(err.kind(), ErrorKind::SectionMissing);
        assert_eq!(err.detail(), Some(".symtab"));
    }

    /// Check that errors without an offending item report no detail.
    #[test]
    fn missing_detail() {
        let err = Error::with_note_section_missing().context("failed to decode metadata");
        assert_eq!(err.kind(), ErrorKind::NoteSectionMissing);
        assert_eq!(err.detail(), None);
        assert_eq!(
            format!("{err:#}"),
            "failed to decode metadata: note section missing"
        );
    }

    /// Make sure that I/O errors are classified as such.
    #[test]
    fn io_error_conversion() {
        let err = io::Error::new(IoErrorKind::NotFound, "no such file");
        let err = Err::<(), _>(err).context("failed to open").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.detail(), None);
        assert_eq!(format!("{err:#}"), "failed to open: no such file");
    }

    /// Check the `Option` conversion helpers.
    #[test]
    fn option_conversion() {
        let err = None::<()>.ok_or_truncated(|| "no more data").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated);
        let ok = Some(42).ok_or_invalid_field(|| "unused").unwrap();
        assert_eq!(ok, 42);
    }
}
