use divan::AllocProfiler;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

fn synthesized(format: lumpkit_archive::ArchiveFormat, entries: usize) -> Vec<u8> {
    use lumpkit_archive::{Archive, ArchiveEntry};

    let mut archive = Archive::new(format).unwrap();
    for i in 0..entries {
        let data = vec![(i % 251) as u8; 64 + i % 512];
        archive
            .add_entry(ArchiveEntry::with_data(format!("LUMP{i:04}.DAT"), data), None, None)
            .unwrap();
    }

    let mut out = Vec::new();
    archive.write(&mut out).unwrap();
    out
}

pub mod read {
    use divan::Bencher;
    use lumpkit_archive::{Archive, ArchiveFormat};

    #[divan::bench(args = [ArchiveFormat::Gob, ArchiveFormat::Lib, ArchiveFormat::Wad])]
    fn open(bencher: Bencher, format: ArchiveFormat) {
        bencher
            .with_inputs(|| super::synthesized(format, 1000))
            .bench_local_refs(|data| {
                divan::black_box(Archive::from_data(data).unwrap());
            });
    }

    #[divan::bench]
    fn detect(bencher: Bencher) {
        bencher
            .with_inputs(|| super::synthesized(ArchiveFormat::Lib, 1000))
            .bench_local_refs(|data| {
                divan::black_box(lumpkit_archive::detect_format(data));
            });
    }

    #[divan::bench]
    fn open_rff(bencher: Bencher) {
        bencher
            .with_inputs(|| {
                std::fs::read(format!(
                    "{}/tests/resources/blood.rff",
                    env!("CARGO_MANIFEST_DIR")
                ))
                .unwrap()
            })
            .bench_local_refs(|data| {
                divan::black_box(Archive::from_data(data).unwrap());
            });
    }
}

pub mod write {
    use divan::Bencher;
    use lumpkit_archive::{Archive, ArchiveFormat};

    #[divan::bench(args = [ArchiveFormat::Gob, ArchiveFormat::Hog, ArchiveFormat::Pak])]
    fn write(bencher: Bencher, format: ArchiveFormat) {
        bencher
            .with_inputs(|| {
                let mut archive = Archive::new(format).unwrap();
                archive
                    .open_data(&super::synthesized(format, 1000))
                    .unwrap();
                archive
            })
            .bench_local_refs(|archive| {
                let mut out = Vec::new();
                archive.write(&mut out).unwrap();
                divan::black_box(out);
            });
    }
}
