use std::fs;
use std::os::unix::fs::PermissionsExt;

use tempfile::tempdir;
use tidyd::core::models::{TransferMode, TransferStatus};
use tidyd::core::transfer_engine::FixedSpace;
use tidyd::core::verifier::checksum;
use tidyd::core::{
    BatchOptions, BatchOutcome, ChecksumAlgorithm, JobRegistry, MoveOptions, TransferEngine, WorkOrchestrator,
};
use tidyd::workflows::CollectPdfs;

fn safe(reason: &str) -> MoveOptions<'_> {
    MoveOptions {
        dry_run: false,
        safe_mode: true,
        reason,
    }
}

#[test]
fn safe_move_keeps_exactly_one_verified_copy() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("report.pdf");
    let dest_dir = temp.path().join("docs");
    fs::write(&src, vec![7u8; 100_000]).unwrap();
    fs::set_permissions(&src, fs::Permissions::from_mode(0o640)).unwrap();
    let expected = checksum(&src, ChecksumAlgorithm::Blake3).unwrap();

    let engine = TransferEngine::new(ChecksumAlgorithm::Blake3);
    let record = engine.move_file(&src, &dest_dir, &safe("Consolidate PDF"));

    assert_eq!(record.status, TransferStatus::Moved);
    assert_eq!(record.mode, TransferMode::SafeVerify);
    let dest = record.dest.unwrap();
    assert_eq!(dest, dest_dir.join("report.pdf"));
    assert!(!src.exists());
    assert_eq!(checksum(&dest, ChecksumAlgorithm::Blake3).unwrap(), expected);
    assert_eq!(fs::metadata(&dest).unwrap().permissions().mode() & 0o777, 0o640);
}

#[test]
fn safe_move_never_overwrites() {
    let temp = tempdir().unwrap();
    let dest_dir = temp.path().join("docs");
    fs::create_dir(&dest_dir).unwrap();
    fs::write(dest_dir.join("a.pdf"), b"original").unwrap();
    fs::write(dest_dir.join("a_1.pdf"), b"first copy").unwrap();

    let src = temp.path().join("a.pdf");
    fs::write(&src, b"newcomer").unwrap();

    let record = TransferEngine::default().move_file(&src, &dest_dir, &safe("Consolidate PDF"));

    assert_eq!(record.dest.as_deref(), Some(dest_dir.join("a_2.pdf").as_path()));
    assert_eq!(fs::read(dest_dir.join("a.pdf")).unwrap(), b"original");
    assert_eq!(fs::read(dest_dir.join("a_1.pdf")).unwrap(), b"first copy");
    assert_eq!(fs::read(dest_dir.join("a_2.pdf")).unwrap(), b"newcomer");
}

#[test]
fn low_space_leaves_source_alone() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("big.pdf");
    let dest_dir = temp.path().join("docs");
    fs::write(&src, vec![1u8; 4096]).unwrap();

    let engine = TransferEngine::default().with_space_probe(FixedSpace(1024));
    let record = engine.move_file(&src, &dest_dir, &safe("Consolidate PDF"));

    assert_eq!(record.status, TransferStatus::Error);
    assert_eq!(record.error.as_deref(), Some("Insufficient disk space"));
    assert!(src.exists());
    assert_eq!(fs::read_dir(&dest_dir).unwrap().count(), 0);
}

#[test]
fn safe_batch_moves_every_file_once() {
    let temp = tempdir().unwrap();
    let source = temp.path().join("drive");
    let dest = temp.path().join("pdfs");
    for dir in ["Users/a", "Users/b", "Windows/help"] {
        fs::create_dir_all(source.join(dir)).unwrap();
    }
    // Same name in two folders forces a collision suffix
    fs::write(source.join("Users/a/invoice.pdf"), b"from a").unwrap();
    fs::write(source.join("Users/b/invoice.pdf"), b"from b").unwrap();
    fs::write(source.join("Users/b/scan.PDF"), b"scan").unwrap();
    fs::write(source.join("Windows/help/manual.pdf"), b"system").unwrap();

    let registry = JobRegistry::new();
    let job_id = registry.create("collect_pdfs");
    let orchestrator = WorkOrchestrator::new(registry.clone(), TransferEngine::default());
    let opts = BatchOptions {
        dry_run: false,
        safe_mode: true,
    };

    let BatchOutcome::Completed(summary) = orchestrator.run(&job_id, &source, &CollectPdfs::new(&dest), opts) else {
        panic!("expected completion");
    };

    assert_eq!(summary.moved, 3);
    assert_eq!(summary.errors, 0);
    assert!(summary.details.iter().all(|r| r.mode == TransferMode::SafeVerify));
    assert_eq!(fs::read(dest.join("invoice.pdf")).unwrap(), b"from a");
    assert_eq!(fs::read(dest.join("invoice_1.pdf")).unwrap(), b"from b");
    assert!(dest.join("scan.PDF").exists());
    assert!(source.join("Windows/help/manual.pdf").exists());
    assert!(!source.join("Users/a/invoice.pdf").exists());
}
