//! Shared test utilities for usbforge tests.
//!
//! Device operations never touch the host: commands go to [`FakeRunner`],
//! downloads to [`FakeDownloader`], and "mount points" are plain temporary
//! directories.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use tempfile::TempDir;

use usbforge::assets::Downloader;
use usbforge::config::Config;
use usbforge::drives::Drive;
use usbforge::error::Result;
use usbforge::process::{Cmd, CommandResult, CommandRunner};
use usbforge::progress::ProgressSink;
use usbforge::prompt::Prompter;
use usbforge::assets::AssetKey;

pub const GIB: u64 = 1024 * 1024 * 1024;

// =============================================================================
// Test environment
// =============================================================================

/// Scratch directories standing in for ISOs, downloads and mount points.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub isos: PathBuf,
    pub downloads: PathBuf,
    pub mounts: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let isos = base.join("isos");
        let downloads = base.join("downloads");
        let mounts = base.join("mnt");
        fs::create_dir_all(&isos).expect("Failed to create isos dir");

        Self {
            _temp_dir: temp_dir,
            isos,
            downloads,
            mounts,
        }
    }

    /// Write a fake image into the ISO directory.
    pub fn image(&self, name: &str, content: &str) -> PathBuf {
        let path = self.isos.join(name);
        fs::write(&path, content).expect("Failed to write image");
        path
    }

    /// Write a placeholder installer script in a `ventoy-*` release dir.
    pub fn installer(&self) -> PathBuf {
        let dir = self.downloads.join("ventoy").join("ventoy-1.0.99");
        fs::create_dir_all(&dir).expect("Failed to create installer dir");
        let script = dir.join("Ventoy2Disk.sh");
        fs::write(&script, "#!/bin/sh\n").expect("Failed to write installer");
        script
    }

    /// Config pointing every asset, mount and download at this environment.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config
            .paths
            .insert("ubuntu_iso".into(), self.image("ubuntu-24.04-desktop-amd64.iso", "ubuntu"));
        config
            .paths
            .insert("kali_iso".into(), self.image("kali-linux-2024.1-live-amd64.iso", "kali"));
        config
            .paths
            .insert("windows_iso".into(), self.image("Win11_23H2_English_x64.iso", "windows"));
        config
            .paths
            .insert("wtg_img".into(), self.image("wtg.img", "raw windows to go image"));

        config.bootmenu.installer = Some(self.installer());
        config.download_dir = Some(self.downloads.clone());
        config.mounts.boot_layer = self.mounts.join("ventoy");
        config.mounts.persistence = self.mounts.join("kali_persistence");
        config.mounts.raw_image = self.mounts.join("wtg");
        config
    }
}

pub fn drive(name: &str, size_bytes: u64) -> Drive {
    Drive {
        name: name.to_string(),
        path: PathBuf::from(format!("/dev/{}", name)),
        size_bytes,
        size_human: usbforge::drives::human_size(size_bytes),
        model: "SanDisk Ultra".to_string(),
        removable: true,
    }
}

/// `lsblk -J` output for the given `(name, removable, bytes, type)` devices.
pub fn lsblk_json(devices: &[(&str, bool, u64, &str)]) -> String {
    let entries: Vec<String> = devices
        .iter()
        .map(|(name, rm, size, kind)| {
            format!(
                r#"{{"name":"{}","rm":{},"size":{},"model":"Test Disk","type":"{}"}}"#,
                name, rm, size, kind
            )
        })
        .collect();
    format!(r#"{{"blockdevices":[{}]}}"#, entries.join(","))
}

// =============================================================================
// Fake command runner
// =============================================================================

/// A command as the fake runner received it.
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub line: String,
    pub program: String,
    pub dir: Option<PathBuf>,
    pub stdin: Option<String>,
}

/// Records every command and succeeds unless told otherwise.
#[derive(Default)]
pub struct FakeRunner {
    calls: RefCell<Vec<RecordedCommand>>,
    failures: RefCell<Vec<(String, i32, String)>>,
    outputs: RefCell<Vec<(String, String)>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any command whose line contains `needle`.
    pub fn fail_on(&self, needle: &str, code: i32, stderr: &str) {
        self.failures
            .borrow_mut()
            .push((needle.to_string(), code, stderr.to_string()));
    }

    /// Answer `program` with `stdout`.
    pub fn respond(&self, program: &str, stdout: &str) {
        self.outputs
            .borrow_mut()
            .push((program.to_string(), stdout.to_string()));
    }

    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.calls.borrow().clone()
    }

    /// Every command line, in order.
    pub fn lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.line.clone()).collect()
    }

    pub fn count(&self, program: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program == program)
            .count()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.calls.borrow().iter().any(|c| c.line.contains(needle))
    }
}

impl CommandRunner for FakeRunner {
    fn execute(&self, cmd: &Cmd) -> Result<CommandResult> {
        let line = cmd.display();
        self.calls.borrow_mut().push(RecordedCommand {
            line: line.clone(),
            program: cmd.program().to_string(),
            dir: cmd.current_dir().map(Path::to_path_buf),
            stdin: cmd.stdin_data().map(str::to_string),
        });

        if let Some((_, code, stderr)) = self
            .failures
            .borrow()
            .iter()
            .find(|(needle, _, _)| line.contains(needle.as_str()))
        {
            return Ok(CommandResult::failure(*code, stderr.clone()));
        }

        let stdout = self
            .outputs
            .borrow()
            .iter()
            .find(|(program, _)| program == cmd.program())
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        Ok(CommandResult::success_with(stdout))
    }
}

// =============================================================================
// Fake downloader
// =============================================================================

/// Writes fixed content instead of fetching.
pub struct FakeDownloader {
    pub content: Vec<u8>,
    pub fail: bool,
    calls: RefCell<Vec<String>>,
}

impl FakeDownloader {
    pub fn new(content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            fail: false,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(b"")
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Downloader for FakeDownloader {
    fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<()> {
        self.calls.borrow_mut().push(url.to_string());
        if self.fail {
            anyhow::bail!("HTTP 404 for {}", url);
        }
        progress.start(url, Some(self.content.len() as u64));
        fs::write(dest, &self.content)?;
        progress.advance(self.content.len() as u64);
        progress.finish();
        Ok(())
    }
}

// =============================================================================
// Local HTTP server
// =============================================================================

/// A canned HTTP response.
pub struct Reply {
    pub status: u16,
    pub reason: &'static str,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn new(status: u16, reason: &'static str, body: &[u8]) -> Self {
        Self {
            status,
            reason,
            body: body.to_vec(),
        }
    }

    pub fn ok(body: &[u8]) -> Self {
        Self::new(200, "OK", body)
    }

    pub fn partial(body: &[u8]) -> Self {
        Self::new(206, "Partial Content", body)
    }
}

/// One-connection-per-request HTTP/1.1 server on a loopback port.
///
/// The handler receives the request index and the parsed `Range` start.
/// Every request's range is recorded in order.
pub struct TestServer {
    addr: SocketAddr,
    ranges: Arc<Mutex<Vec<Option<u64>>>>,
}

impl TestServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(usize, Option<u64>) -> Reply + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to read server address");
        let ranges = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&ranges);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let range = read_range_header(&mut stream);
                let index = {
                    let mut seen = seen.lock().unwrap();
                    seen.push(range);
                    seen.len() - 1
                };
                let reply = handler(index, range);
                let head = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    reply.status,
                    reply.reason,
                    reply.body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&reply.body);
                let _ = stream.flush();
            }
        });

        Self { addr, ranges }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path)
    }

    /// Range start of every request served so far.
    pub fn ranges(&self) -> Vec<Option<u64>> {
        self.ranges.lock().unwrap().clone()
    }
}

/// Read request headers and return the start of a `Range: bytes=N-` header.
fn read_range_header(stream: &mut TcpStream) -> Option<u64> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    String::from_utf8_lossy(&request).lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("range") {
            return None;
        }
        value
            .trim()
            .strip_prefix("bytes=")?
            .trim_end_matches('-')
            .parse()
            .ok()
    })
}

// =============================================================================
// Progress and prompts
// =============================================================================

/// Remembers labels and bytes reported.
#[derive(Default)]
pub struct RecordingProgress {
    pub labels: RefCell<Vec<String>>,
    pub bytes: Cell<u64>,
    pub finished: Cell<usize>,
}

impl ProgressSink for RecordingProgress {
    fn start(&self, label: &str, _total: Option<u64>) {
        self.labels.borrow_mut().push(label.to_string());
    }

    fn advance(&self, delta: u64) {
        self.bytes.set(self.bytes.get() + delta);
    }

    fn finish(&self) {
        self.finished.set(self.finished.get() + 1);
    }
}

/// Scripted answers for interactive runs.
pub struct ScriptedPrompter {
    pub drive: Option<usize>,
    pub sizes: RefCell<Vec<u64>>,
    pub confirm: bool,
    pub size_prompts: Cell<usize>,
    pub asset_prompts: RefCell<Vec<AssetKey>>,
}

impl ScriptedPrompter {
    pub fn new(drive: Option<usize>, sizes: &[u64], confirm: bool) -> Self {
        Self {
            drive,
            sizes: RefCell::new(sizes.to_vec()),
            confirm,
            size_prompts: Cell::new(0),
            asset_prompts: RefCell::new(Vec::new()),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn select_drive(&self, _drives: &[Drive]) -> Result<Option<usize>> {
        Ok(self.drive)
    }

    fn asset_path(&self, key: AssetKey) -> Result<Option<PathBuf>> {
        self.asset_prompts.borrow_mut().push(key);
        Ok(None)
    }

    fn raw_image_size(&self, default_gb: u64, _bound: f64) -> Result<u64> {
        self.size_prompts.set(self.size_prompts.get() + 1);
        let mut sizes = self.sizes.borrow_mut();
        Ok(if sizes.is_empty() {
            default_gb
        } else {
            sizes.remove(0)
        })
    }

    fn confirm(&self, _message: &str) -> Result<bool> {
        Ok(self.confirm)
    }
}

// =============================================================================
// Assertions
// =============================================================================

/// Assert a file exists and contains the expected content.
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    assert!(
        content.contains(expected),
        "File {} should contain '{}'\nActual content:\n{}",
        path.display(),
        expected,
        content
    );
}
