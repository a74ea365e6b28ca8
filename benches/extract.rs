use std::hint::black_box;

use hipkern::bundle::find_code_object;
use hipkern::bundle::DEFAULT_TARGETS;
use hipkern::test_helper::bundle;
use hipkern::test_helper::code_object;
use hipkern::test_helper::KernelDesc;
use hipkern::Extractor;

use criterion::measurement::Measurement;
use criterion::BenchmarkGroup;
use criterion::Bencher;


/// The number of kernels in the benchmarked code object.
const KERNEL_COUNT: usize = 256;


fn kernels() -> Vec<KernelDesc> {
    (0..KERNEL_COUNT)
        .map(|idx| {
            (0..12).fold(KernelDesc::new(&format!("_Z8kernel{idx:03}Pfi")), |kernel, arg| {
                let kind = if arg < 8 { "global_buffer" } else { "hidden_global_offset_x" };
                kernel.arg(arg * 8, 8, kind)
            })
        })
        .collect()
}

fn bundled_object() -> Vec<u8> {
    let object = code_object(&kernels());
    bundle(&[
        ("host-x86_64-unknown-linux-gnu", b"".as_slice()),
        ("hipv4-amdgcn-amd-amdhsa--gfx90a", object.as_slice()),
        ("hip-amdgcn-amd-amdhsa--gfx906", object.as_slice()),
    ])
}


/// Extract the kernel catalogue of a bundled code object, end-to-end.
fn extract_bundle<M>(b: &mut Bencher<'_, M>)
where
    M: Measurement,
{
    let data = bundled_object();
    let extractor = Extractor::new();

    let () = b.iter(|| {
        let catalog = extractor.extract(black_box(&data)).unwrap();
        assert_eq!(catalog.len(), KERNEL_COUNT);
    });
}

/// Locate the code object inside of an offload bundle.
fn locate_code_object<M>(b: &mut Bencher<'_, M>)
where
    M: Measurement,
{
    let data = bundled_object();

    let () = b.iter(|| {
        let offset = find_code_object(black_box(&data), &DEFAULT_TARGETS).unwrap();
        assert_ne!(offset, 0);
    });
}

pub fn benchmark<M>(group: &mut BenchmarkGroup<'_, M>)
where
    M: Measurement,
{
    bench_sub_fn!(group, extract_bundle);
    bench_sub_fn!(group, locate_code_object);
}
