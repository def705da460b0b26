use lumpkit_archive::{
    error::Error, Archive, ArchiveEntry, ArchiveFormat, EntryState,
};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use tracing_test::traced_test;

fn resource(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/resources")
        .join(name)
}

/// (path, size, data) of every entry, in tree order
fn snapshot(archive: &Archive) -> Vec<(String, usize, Vec<u8>)> {
    archive
        .all_entries()
        .iter()
        .map(|e| (e.path(), e.size(), e.to_vec()))
        .collect()
}

#[instrument(skip_all, fields(file = %path.display()))]
fn validate_round_trip(path: &Path) -> Result<(), Error> {
    let mut original = Archive::from_file(path)?;
    let expected = snapshot(&original);

    let mut written = Vec::new();
    original.write(&mut written)?;
    info!("wrote {} bytes", written.len());

    let reopened = Archive::from_data(&written)?;
    assert_eq!(reopened.format(), original.format());
    assert_eq!(snapshot(&reopened), expected);

    Ok(())
}

#[traced_test]
#[test]
fn writable_formats_round_trip() -> Result<(), Error> {
    for name in ["briefing.gob", "mission.hog", "castle.lib", "maps.wad", "quake.pak"] {
        validate_round_trip(&resource(name))?;
    }
    Ok(())
}

#[test]
fn hog_text_is_reencoded_byte_for_byte() -> Result<(), Error> {
    let path = resource("mission.hog");
    let mut archive = Archive::from_file(&path)?;

    let mut written = Vec::new();
    archive.write(&mut written)?;

    assert_eq!(written, std::fs::read(&path)?);
    Ok(())
}

#[test]
fn gob_offsets_follow_entry_order() -> Result<(), Error> {
    let sizes = [0usize, 5, 1, 300, 17];
    let mut archive = Archive::new(ArchiveFormat::Gob)?;
    for (i, size) in sizes.iter().enumerate() {
        archive.add_entry(
            ArchiveEntry::with_data(format!("LUMP{i}.DAT"), vec![i as u8; *size]),
            None,
            None,
        )?;
    }

    let mut written = Vec::new();
    archive.write(&mut written)?;
    let reopened = Archive::from_data(&written)?;

    let mut expected_offset = 8;
    for (i, size) in sizes.iter().enumerate() {
        let entry = reopened.entry_at(i).unwrap();
        assert_eq!(entry.offset_on_disk() as usize, expected_offset, "entry {i}");
        assert_eq!(entry.size(), *size);
        expected_offset += size;
    }

    let dir_offset = u32::from_le_bytes(written[4..8].try_into().unwrap());
    assert_eq!(dir_offset as usize, 8 + sizes.iter().sum::<usize>());

    Ok(())
}

#[test]
fn reordering_changes_the_layout() -> Result<(), Error> {
    let mut archive = Archive::from_file(resource("briefing.gob"))?;
    let last = archive.entry_at(2).unwrap();
    archive.move_entry(&last, 0)?;

    let mut written = Vec::new();
    archive.write(&mut written)?;
    let reopened = Archive::from_data(&written)?;

    let names: Vec<String> = reopened.all_entries().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["EMPTY.DAT", "BRIEF.TXT", "SECBASE.LVL"]);
    assert_eq!(reopened.entry_at(1).unwrap().offset_on_disk(), 8);
    Ok(())
}

fn assert_empty(archive: &Archive) {
    assert_eq!(archive.num_entries(true), 0);
    assert_eq!(archive.root_dir().num_subdirs(), 0);
}

#[traced_test]
#[test]
fn truncated_archives_are_rejected() -> Result<(), Error> {
    for (name, format) in [
        ("briefing.gob", ArchiveFormat::Gob),
        ("blood.rff", ArchiveFormat::Rff),
        ("maps.wad", ArchiveFormat::Wad),
        ("quake.pak", ArchiveFormat::Pak),
    ] {
        let data = std::fs::read(resource(name))?;
        for len in 0..data.len() {
            let mut archive = Archive::new(format)?;
            assert!(archive.open_data(&data[..len]).is_err(), "{name} cut at {len} opened");
            assert_empty(&archive);
        }
    }

    assert!(logs_contain("Archive is invalid and/or corrupt"));
    Ok(())
}

#[test]
fn hog_only_opens_at_lump_boundaries() -> Result<(), Error> {
    let data = std::fs::read(resource("mission.hog"))?;
    let full = Archive::from_data(&data)?;

    let mut boundaries = vec![3];
    for entry in full.all_entries() {
        let end = entry.offset_on_disk() + entry.size_on_disk();
        boundaries.push(end as usize);
    }

    for len in 0..data.len() {
        let mut archive = Archive::new(ArchiveFormat::Hog)?;
        let result = archive.open_data(&data[..len]);
        if boundaries.contains(&len) {
            assert!(result.is_ok(), "cut at {len} rejected");
        } else {
            assert!(result.is_err(), "cut at {len} opened");
            assert_empty(&archive);
        }
    }

    Ok(())
}

#[test]
fn lib_failures_leave_nothing_behind() -> Result<(), Error> {
    let data = std::fs::read(resource("castle.lib"))?;
    let mut failures = 0;

    for len in 0..data.len() {
        let mut archive = Archive::new(ArchiveFormat::Lib)?;
        if archive.open_data(&data[..len]).is_err() {
            failures += 1;
            assert_empty(&archive);
        }
    }

    assert!(failures >= 2);
    Ok(())
}

#[test]
fn lib_refuses_more_than_65535_entries() -> Result<(), Error> {
    let mut archive = Archive::new(ArchiveFormat::Lib)?;
    for i in 0..65_536u32 {
        archive
            .root_dir()
            .add_entry(ArchiveEntry::new(format!("E{i:05X}")), None, true)?;
    }
    archive.set_modified(true);

    let mut out = b"previous contents".to_vec();
    let result = archive.write(&mut out);

    assert!(matches!(
        result,
        Err(Error::TooManyEntries {
            count: 65_536,
            max: 65_535
        })
    ));
    assert_eq!(out, b"previous contents");
    assert!(archive.is_modified());
    assert_eq!(archive.entry_at(0).unwrap().state(), EntryState::New);
    Ok(())
}

#[test]
fn rff_cannot_be_saved() -> Result<(), Error> {
    let mut archive = Archive::from_file(resource("blood.rff"))?;
    let mut out = Vec::new();

    let result = archive.write(&mut out);

    assert!(matches!(
        result,
        Err(Error::UnsupportedOperation {
            format: ArchiveFormat::Rff,
            ..
        })
    ));
    assert!(out.is_empty());
    Ok(())
}

#[test]
fn save_and_reload_through_the_filesystem() -> Result<(), Error> {
    let folder = tempfile::tempdir()?;
    let mut archive = Archive::from_file(resource("quake.pak"))?;
    let target = folder.path().join("copy.pak");

    archive.save(&target)?;
    assert_eq!(archive.filename(), Some(target.as_path()));

    let reopened = Archive::from_file(&target)?;
    assert_eq!(snapshot(&reopened), snapshot(&archive));

    let extracted = folder.path().join("extracted");
    let mut as_folder = Archive::new(ArchiveFormat::Dir)?;
    as_folder.import_dir(archive.root_dir(), None, None)?;
    as_folder.save(&extracted)?;
    assert_eq!(
        std::fs::read(extracted.join("maps/start.bsp"))?,
        archive.entry_at_path("maps/start.bsp").unwrap().to_vec()
    );

    Ok(())
}
