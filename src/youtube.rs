use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::AcquisitionError;
use crate::{TranscriptDocument, extract_video_id, vtt};

/// Subtitle language requested from yt-dlp
pub const SUBTITLE_LANG: &str = "en";

const CAPTION_EXTENSION: &str = "vtt";
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL_LINES: usize = 5;

/// Downloads caption files for a video into a directory
pub trait CaptionFetcher {
    /// Write the caption files for `url` into `dest`. Returning `Ok` means
    /// the tool reported success; it does not promise that a file exists.
    fn fetch_captions(&self, url: &str, dest: &Path) -> Result<(), AcquisitionError>;
}

/// Runs the `yt-dlp` binary in subtitle-only mode
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn args(url: &str, dest: &Path) -> Vec<OsString> {
        let template = dest.join("%(id)s.%(ext)s");
        vec![
            "--skip-download".into(),
            "--write-auto-sub".into(),
            "--write-sub".into(),
            "--sub-lang".into(),
            SUBTITLE_LANG.into(),
            "--sub-format".into(),
            CAPTION_EXTENSION.into(),
            "--no-playlist".into(),
            "-o".into(),
            template.into_os_string(),
            url.into(),
        ]
    }
}

impl CaptionFetcher for YtDlp {
    fn fetch_captions(&self, url: &str, dest: &Path) -> Result<(), AcquisitionError> {
        debug!("Fetching subtitles via {}: {url}", self.program);

        let mut child = Command::new(&self.program)
            .args(Self::args(url, dest))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AcquisitionError::ToolMissing(self.program.clone()),
                _ => AcquisitionError::Spawn(e),
            })?;

        // Drain stderr on its own thread so a chatty child never blocks on a full pipe
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    stop(&mut child);
                    return Err(AcquisitionError::Spawn(e));
                }
            }
            if started.elapsed() > self.timeout {
                warn!("yt-dlp exceeded {:?}, killing it", self.timeout);
                stop(&mut child);
                return Err(AcquisitionError::Timeout(self.timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(AcquisitionError::FetchFailed {
                status,
                stderr: stderr_tail(&stderr),
            });
        }

        debug!("yt-dlp finished in {:?}", started.elapsed());
        Ok(())
    }
}

/// Kill and reap the child so nothing outlives the working directory
fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Turns a video URL into caption text using a scoped working directory
#[derive(Debug, Clone)]
pub struct Acquirer<F> {
    fetcher: F,
}

impl<F: CaptionFetcher> Acquirer<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch, locate and flatten the captions for `url`.
    ///
    /// The working directory is removed when this returns, on every path.
    pub fn acquire(&self, url: &str) -> Result<TranscriptDocument, AcquisitionError> {
        let workdir = tempfile::Builder::new()
            .prefix("ytsum-")
            .tempdir()
            .map_err(AcquisitionError::TempDir)?;
        debug!("Subtitle working directory: {}", workdir.path().display());

        self.fetcher.fetch_captions(url, workdir.path())?;

        let caption = find_caption_file(workdir.path())?.ok_or(AcquisitionError::NoSubtitles)?;
        info!("Using caption file {}", caption.display());

        let text = vtt::extract(&caption)?;

        workdir.close().map_err(AcquisitionError::Cleanup)?;

        Ok(TranscriptDocument {
            video_id: extract_video_id(url),
            text,
        })
    }
}

/// First `.vtt` file among the immediate entries of `dir`, by file name
pub fn find_caption_file(dir: &Path) -> Result<Option<PathBuf>, AcquisitionError> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(AcquisitionError::Scan)? {
        let entry = entry.map_err(AcquisitionError::Scan)?;
        let path = entry.path();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if is_file && path.extension().and_then(|e| e.to_str()) == Some(CAPTION_EXTENSION) {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Writes the given files into the working directory, then succeeds or fails
    struct FakeFetcher {
        files: Vec<(&'static str, &'static [u8])>,
        fail: bool,
        seen_dir: Mutex<Option<PathBuf>>,
    }

    impl FakeFetcher {
        fn writing(files: Vec<(&'static str, &'static [u8])>) -> Self {
            Self {
                files,
                fail: false,
                seen_dir: Mutex::new(None),
            }
        }

        fn failing_after(files: Vec<(&'static str, &'static [u8])>) -> Self {
            Self {
                fail: true,
                ..Self::writing(files)
            }
        }

        fn seen_dir(&self) -> PathBuf {
            self.seen_dir.lock().unwrap().clone().expect("fetcher was not called")
        }
    }

    impl CaptionFetcher for FakeFetcher {
        fn fetch_captions(&self, _url: &str, dest: &Path) -> Result<(), AcquisitionError> {
            *self.seen_dir.lock().unwrap() = Some(dest.to_path_buf());
            for (name, content) in &self.files {
                std::fs::write(dest.join(name), content).unwrap();
            }
            if self.fail {
                return Err(AcquisitionError::FetchFailed {
                    status: failed_status(),
                    stderr: "ERROR: Video unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    #[cfg(unix)]
    fn failed_status() -> std::process::ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(1 << 8)
    }

    #[cfg(windows)]
    fn failed_status() -> std::process::ExitStatus {
        use std::os::windows::process::ExitStatusExt;
        std::process::ExitStatus::from_raw(1)
    }

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
    const SAMPLE: &[u8] = b"WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nHello world\n";
    const HEADER_ONLY: &[u8] = b"WEBVTT\n";
    const INFO_JSON: &[u8] = b"{}";
    const NOT_UTF8: &[u8] = &[0xff, 0xfe, 0x80];

    #[test]
    fn test_acquire_success() {
        let acquirer = Acquirer::new(FakeFetcher::writing(vec![("dQw4w9WgXcQ.en.vtt", SAMPLE)]));
        let doc = acquirer.acquire(URL).unwrap();
        assert_eq!(doc.text, "Hello world");
        assert_eq!(doc.video_id.as_deref(), Some("dQw4w9WgXcQ"));
        assert!(!acquirer.fetcher().seen_dir().exists());
    }

    #[test]
    fn test_acquire_fetch_failure_skips_partial_output() {
        let acquirer = Acquirer::new(FakeFetcher::failing_after(vec![("partial.en.vtt", SAMPLE)]));
        let err = acquirer.acquire(URL).unwrap_err();
        assert!(matches!(err, AcquisitionError::FetchFailed { .. }));
        assert!(err.to_string().starts_with("Failed to fetch subtitles using yt-dlp"));
        assert!(!acquirer.fetcher().seen_dir().exists());
    }

    #[test]
    fn test_acquire_no_subtitles() {
        let acquirer = Acquirer::new(FakeFetcher::writing(vec![("dQw4w9WgXcQ.info.json", INFO_JSON)]));
        let err = acquirer.acquire(URL).unwrap_err();
        assert!(matches!(err, AcquisitionError::NoSubtitles));
        assert_eq!(err.to_string(), "No subtitles available for this video");
        assert!(!acquirer.fetcher().seen_dir().exists());
    }

    #[test]
    fn test_acquire_unreadable_caption() {
        let acquirer = Acquirer::new(FakeFetcher::writing(vec![("bad.en.vtt", NOT_UTF8)]));
        let err = acquirer.acquire(URL).unwrap_err();
        assert!(matches!(err, AcquisitionError::Parse(_)));
        assert!(!acquirer.fetcher().seen_dir().exists());
    }

    #[test]
    fn test_acquire_header_only_caption() {
        let acquirer = Acquirer::new(FakeFetcher::writing(vec![("x.en.vtt", HEADER_ONLY)]));
        let doc = acquirer.acquire(URL).unwrap();
        assert_eq!(doc.text, "");
    }

    #[test]
    fn test_find_caption_file_picks_first_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.en.vtt"), "WEBVTT").unwrap();
        std::fs::write(dir.path().join("a.en-orig.vtt"), "WEBVTT").unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::fs::create_dir(dir.path().join("nested.vtt")).unwrap();

        let found = find_caption_file(dir.path()).unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "a.en-orig.vtt");
    }

    #[test]
    fn test_find_caption_file_ignores_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("x.vtt"), "WEBVTT").unwrap();
        assert!(find_caption_file(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_ytdlp_args() {
        let args = YtDlp::args(URL, Path::new("/tmp/work"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().to_string()).collect();
        assert!(args.contains(&"--skip-download".to_string()));
        assert!(args.contains(&"--write-auto-sub".to_string()));
        assert!(args.contains(&"--write-sub".to_string()));
        assert!(args.windows(2).any(|w| w == ["--sub-lang", "en"]));
        assert!(args.windows(2).any(|w| w == ["--sub-format", "vtt"]));
        assert!(args.windows(2).any(|w| w[0] == "-o" && w[1].starts_with("/tmp/work")));
        assert_eq!(args.last().map(String::as_str), Some(URL));
    }

    #[test]
    fn test_ytdlp_missing_binary() {
        let fetcher = YtDlp::new("ytsum-definitely-not-installed", Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher.fetch_captions(URL, dir.path()).unwrap_err();
        assert!(matches!(err, AcquisitionError::ToolMissing(_)));
    }

    /// Remembers the working directory, then hands off to the real runner
    #[cfg(unix)]
    struct Observed {
        inner: YtDlp,
        seen_dir: Mutex<Option<PathBuf>>,
    }

    #[cfg(unix)]
    impl Observed {
        fn new(inner: YtDlp) -> Self {
            Self {
                inner,
                seen_dir: Mutex::new(None),
            }
        }

        fn seen_dir(&self) -> PathBuf {
            self.seen_dir.lock().unwrap().clone().expect("fetcher was not called")
        }
    }

    #[cfg(unix)]
    impl CaptionFetcher for Observed {
        fn fetch_captions(&self, url: &str, dest: &Path) -> Result<(), AcquisitionError> {
            *self.seen_dir.lock().unwrap() = Some(dest.to_path_buf());
            self.inner.fetch_captions(url, dest)
        }
    }

    /// Executable shell script standing in for yt-dlp; `${10}` is the `-o` template
    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path, body: &str, timeout: Duration) -> YtDlp {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        YtDlp::new(path.to_string_lossy().to_string(), timeout)
    }

    #[cfg(unix)]
    #[test]
    fn test_ytdlp_nonzero_exit_is_fetch_failure() {
        let fetcher = YtDlp::new("false", Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher.fetch_captions(URL, dir.path()).unwrap_err();
        assert!(matches!(err, AcquisitionError::FetchFailed { .. }));
        assert!(err.to_string().starts_with("Failed to fetch subtitles using yt-dlp"));
    }

    #[cfg(unix)]
    #[test]
    fn test_ytdlp_timeout_kills_child() {
        let bin = tempfile::tempdir().unwrap();
        let fetcher = fake_ytdlp(bin.path(), "sleep 10", Duration::from_millis(300));
        let dir = tempfile::tempdir().unwrap();

        let started = Instant::now();
        let err = fetcher.fetch_captions(URL, dir.path()).unwrap_err();
        assert!(matches!(err, AcquisitionError::Timeout(t) if t == Duration::from_millis(300)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_acquire_with_ytdlp_success() {
        let bin = tempfile::tempdir().unwrap();
        let body = r#"printf 'WEBVTT\n\n00:00.000 --> 00:01.000\nHello world\n' > "${10%/*}/abc.en.vtt""#;
        let acquirer = Acquirer::new(Observed::new(fake_ytdlp(bin.path(), body, Duration::from_secs(5))));
        let doc = acquirer.acquire(URL).unwrap();
        assert_eq!(doc.text, "Hello world");
        assert!(!acquirer.fetcher().seen_dir().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_acquire_with_ytdlp_failure_ignores_partial_file() {
        let bin = tempfile::tempdir().unwrap();
        let body = r#"echo WEBVTT > "${10%/*}/partial.en.vtt"
echo 'ERROR: Video unavailable' >&2
exit 1"#;
        let acquirer = Acquirer::new(Observed::new(fake_ytdlp(bin.path(), body, Duration::from_secs(5))));
        let err = acquirer.acquire(URL).unwrap_err();
        match err {
            AcquisitionError::FetchFailed { ref stderr, .. } => assert_eq!(stderr, "ERROR: Video unavailable"),
            other => panic!("expected FetchFailed, got {other:?}"),
        }
        assert!(!acquirer.fetcher().seen_dir().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_acquire_with_ytdlp_timeout_cleans_up() {
        let bin = tempfile::tempdir().unwrap();
        let acquirer = Acquirer::new(Observed::new(fake_ytdlp(bin.path(), "sleep 10", Duration::from_millis(300))));
        let err = acquirer.acquire(URL).unwrap_err();
        assert!(matches!(err, AcquisitionError::Timeout(_)));
        assert!(!acquirer.fetcher().seen_dir().exists());
    }

    #[test]
    fn test_stderr_tail() {
        let stderr = "\n1\n2\n\n3\n4\n5\n6\n";
        assert_eq!(stderr_tail(stderr), "2\n3\n4\n5\n6");
        assert_eq!(stderr_tail(""), "");
    }
}
