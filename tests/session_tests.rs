//! End-to-end session tests: drive selection, asset resolution, planning
//! and confirmation in front of the pipeline.

mod helpers;

use helpers::{lsblk_json, FakeDownloader, FakeRunner, RecordingProgress, ScriptedPrompter, TestEnv, GIB};
use usbforge::assets::{AssetKey, AssetResolver};
use usbforge::error::ProvisionError;
use usbforge::pipeline::ProvisionState;
use usbforge::session::{Mode, Session};

fn usb_inventory() -> String {
    lsblk_json(&[
        ("loop0", true, 4096, "loop"),
        ("sda", false, 512 * GIB, "disk"),
        ("sdb", true, 64 * GIB, "disk"),
        ("sdc", true, 32 * GIB, "disk"),
    ])
}

#[test]
fn test_headless_run_uses_first_drive() {
    let env = TestEnv::new();
    let config = env.config();
    let runner = FakeRunner::new();
    runner.respond("lsblk", &usb_inventory());
    let downloader = FakeDownloader::new(b"png");
    let progress = RecordingProgress::default();

    let session = Session::new(&config, Mode::Headless, &runner, &downloader, &progress);
    let state = session.run().unwrap();

    assert_eq!(state, ProvisionState::Finalized);
    // 64 GB drive, default 12 GB persistence, default raw size 32 GB
    assert!(runner.ran("Ventoy2Disk.sh -i /dev/sdb -r 45056 -y"));
    assert!(!runner.ran("/dev/sdc"));
    assert!(!runner.ran("/dev/sda"));
}

#[test]
fn test_no_removable_drive_is_a_hard_stop() {
    let env = TestEnv::new();
    let config = env.config();
    let runner = FakeRunner::new();
    runner.respond(
        "lsblk",
        &lsblk_json(&[("loop0", true, 4096, "loop"), ("sda", false, 512 * GIB, "disk")]),
    );
    let downloader = FakeDownloader::new(b"png");
    let progress = RecordingProgress::default();

    let session = Session::new(&config, Mode::Headless, &runner, &downloader, &progress);
    let err = session.run().unwrap_err();

    assert!(matches!(err, ProvisionError::NoRemovableDrive));
    assert_eq!(runner.lines().len(), 1);
}

#[test]
fn test_missing_raw_boot_image_never_installs_boot_layer() {
    let env = TestEnv::new();
    let mut config = env.config();
    config.paths.remove("wtg_img");
    config.urls.remove("wtg_img");

    let runner = FakeRunner::new();
    runner.respond("lsblk", &usb_inventory());
    let downloader = FakeDownloader::new(b"png");
    let progress = RecordingProgress::default();

    let session = Session::new(&config, Mode::Headless, &runner, &downloader, &progress);
    let err = session.run().unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::AssetUnavailable {
            key: AssetKey::RawBootImage,
            ..
        }
    ));
    assert!(!runner.ran("Ventoy2Disk.sh"));
    assert_eq!(runner.count("fdisk"), 0);
    assert_eq!(downloader.call_count(), 0);
}

#[test]
fn test_missing_asset_is_downloaded_into_download_dir() {
    let env = TestEnv::new();
    let mut config = env.config();
    config.paths.remove("windows_iso");
    config.urls.insert(
        "windows_iso".into(),
        "https://example.com/isos/Win11.iso?dl=1".into(),
    );

    let runner = FakeRunner::new();
    let downloader = FakeDownloader::new(b"windows");
    let progress = RecordingProgress::default();
    let resolver = AssetResolver::new(&downloader, &progress, &env.downloads);

    let session = Session::new(&config, Mode::Headless, &runner, &downloader, &progress);
    let assets = session.resolve_assets(&resolver).unwrap();

    let windows = assets.get(AssetKey::WindowsImage).unwrap();
    assert_eq!(windows.path, env.downloads.join("Win11.iso"));
    assert_eq!(std::fs::read(&windows.path).unwrap(), b"windows");
    assert_eq!(downloader.calls(), vec!["https://example.com/isos/Win11.iso?dl=1"]);
    assert!(!env.downloads.join("Win11.iso.part").exists());

    // Second resolution reuses the download
    session.resolve_assets(&resolver).unwrap();
    assert_eq!(downloader.call_count(), 1);
}

#[test]
fn test_interactive_cancel_at_confirmation_changes_nothing() {
    let env = TestEnv::new();
    let config = env.config();
    let runner = FakeRunner::new();
    runner.respond("lsblk", &usb_inventory());
    let downloader = FakeDownloader::new(b"png");
    let progress = RecordingProgress::default();
    let prompter = ScriptedPrompter::new(Some(0), &[20], false);

    let session = Session::new(
        &config,
        Mode::Interactive(&prompter),
        &runner,
        &downloader,
        &progress,
    );
    let err = session.run().unwrap_err();

    assert!(matches!(err, ProvisionError::UserCancelled));
    assert_eq!(runner.lines().len(), 1, "only lsblk may run");
}

#[test]
fn test_interactive_cancel_at_drive_selection() {
    let env = TestEnv::new();
    let config = env.config();
    let runner = FakeRunner::new();
    runner.respond("lsblk", &usb_inventory());
    let downloader = FakeDownloader::new(b"png");
    let progress = RecordingProgress::default();
    let prompter = ScriptedPrompter::new(None, &[], true);

    let session = Session::new(
        &config,
        Mode::Interactive(&prompter),
        &runner,
        &downloader,
        &progress,
    );
    assert!(matches!(
        session.run().unwrap_err(),
        ProvisionError::UserCancelled
    ));
}

#[test]
fn test_interactive_reprompts_until_size_fits() {
    let env = TestEnv::new();
    let config = env.config();
    let runner = FakeRunner::new();
    runner.respond("lsblk", &usb_inventory());
    let downloader = FakeDownloader::new(b"png");
    let progress = RecordingProgress::default();
    // 50 GB exceeds the 44 GB bound, then 40 GB fits
    let prompter = ScriptedPrompter::new(Some(0), &[50, 40], true);

    let session = Session::new(
        &config,
        Mode::Interactive(&prompter),
        &runner,
        &downloader,
        &progress,
    );
    let drive = session.select_drive().unwrap();
    let plan = session.plan_for(&drive).unwrap();

    assert_eq!(plan.raw_image_gb, 40);
    assert_eq!(prompter.size_prompts.get(), 2);
}

#[test]
fn test_interactive_selects_chosen_drive() {
    let env = TestEnv::new();
    let config = env.config();
    let runner = FakeRunner::new();
    runner.respond("lsblk", &usb_inventory());
    let downloader = FakeDownloader::new(b"png");
    let progress = RecordingProgress::default();
    let prompter = ScriptedPrompter::new(Some(1), &[], true);

    let session = Session::new(
        &config,
        Mode::Interactive(&prompter),
        &runner,
        &downloader,
        &progress,
    );
    let state = session.run().unwrap();

    assert_eq!(state, ProvisionState::Finalized);
    // 32 GB drive: bound 12, default min(32, 12) = 12
    assert!(runner.ran("Ventoy2Disk.sh -i /dev/sdc -r 24576 -y"));
}

#[test]
fn test_interactive_asks_for_unconfigured_paths() {
    let env = TestEnv::new();
    let mut config = env.config();
    config.paths.remove("kali_iso");
    config.urls.insert(
        "kali_iso".into(),
        "https://cdimage.kali.org/kali-2024.1/kali-linux-2024.1-live-amd64.iso".into(),
    );

    let runner = FakeRunner::new();
    let downloader = FakeDownloader::new(b"kali");
    let progress = RecordingProgress::default();
    let resolver = AssetResolver::new(&downloader, &progress, &env.downloads);
    let prompter = ScriptedPrompter::new(Some(0), &[], true);

    let session = Session::new(
        &config,
        Mode::Interactive(&prompter),
        &runner,
        &downloader,
        &progress,
    );
    let assets = session.resolve_assets(&resolver).unwrap();

    assert_eq!(*prompter.asset_prompts.borrow(), vec![AssetKey::PersistenceImage]);
    assert_eq!(assets.len(), 4);
    assert_eq!(downloader.call_count(), 1);
}

#[test]
fn test_headless_oversized_request_fails_with_bound() {
    let env = TestEnv::new();
    let mut config = env.config();
    config.partition.wtg_size_gb = Some(50);

    let runner = FakeRunner::new();
    runner.respond("lsblk", &usb_inventory());
    let downloader = FakeDownloader::new(b"png");
    let progress = RecordingProgress::default();

    let session = Session::new(&config, Mode::Headless, &runner, &downloader, &progress);
    let err = session.run().unwrap_err();

    match err {
        ProvisionError::CapacityExceeded { requested, bound } => {
            assert_eq!(requested, 50);
            assert_eq!(bound, 44.0);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!runner.ran("Ventoy2Disk.sh"));
}
