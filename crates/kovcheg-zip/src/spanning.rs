//! Multi-volume archive traversal.
//!
//! A spanned archive is split across sequentially numbered volume files.
//! [`SpanReader`] presents their bytes as one continuous logical stream,
//! asking a caller-supplied [`VolumeProvider`] for the next volume
//! whenever the current one is exhausted. The provider may block on user
//! input, ask for a retry (media not ready), or abort. Single-volume
//! archives never construct a span reader at all; that fast path stays in
//! the archive handle.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A readable, seekable volume backing store.
pub trait VolumeSource: Read + Seek {}
impl<T: Read + Seek> VolumeSource for T {}

/// Outcome of a volume request.
pub enum VolumeAction {
    /// The volume is available.
    Provide(Box<dyn VolumeSource>),
    /// Ask again (e.g. after the user inserts media).
    Retry,
    /// Give up; the read fails and the span becomes exhausted.
    Abort,
}

/// Supplies volume files on demand.
///
/// Implementations may block indefinitely on user interaction; callers
/// needing bounded latency must wrap their own timeout around this.
pub trait VolumeProvider {
    /// Request volume `number` (zero-based). `is_first_request` marks the
    /// opening request of an operation, letting interactive providers
    /// word their prompt accordingly.
    fn request_volume(&mut self, number: u32, is_first_request: bool) -> io::Result<VolumeAction>;
}

impl<P: VolumeProvider + ?Sized> VolumeProvider for &mut P {
    fn request_volume(&mut self, number: u32, is_first_request: bool) -> io::Result<VolumeAction> {
        (**self).request_volume(number, is_first_request)
    }
}

/// Marker payload carried inside the `io::Error` produced when a
/// provider aborts a volume request.
#[derive(Debug)]
pub struct VolumeAborted;

impl std::fmt::Display for VolumeAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("volume request aborted")
    }
}

impl std::error::Error for VolumeAborted {}

/// Where the span currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanState {
    /// Reading from the given volume.
    OnVolume(u32),
    /// Current volume exhausted; waiting for the provider to hand over
    /// the given volume.
    AwaitingSwap(u32),
    /// The provider aborted; no further bytes will be produced.
    Exhausted,
}

/// A continuous `Read` over sequentially numbered volumes.
pub struct SpanReader<P> {
    provider: P,
    current: Option<Box<dyn VolumeSource>>,
    state: SpanState,
}

impl<P: VolumeProvider> SpanReader<P> {
    /// Open the span at `offset` within `volume`.
    pub fn open_at(mut provider: P, volume: u32, offset: u64) -> io::Result<Self> {
        let mut source = request(&mut provider, volume, true)?;
        source.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            provider,
            current: Some(source),
            state: SpanState::OnVolume(volume),
        })
    }

    /// Current traversal state.
    pub fn state(&self) -> SpanState {
        self.state
    }

    fn advance_volume(&mut self) -> io::Result<()> {
        let next = match self.state {
            SpanState::OnVolume(n) => n + 1,
            SpanState::AwaitingSwap(n) => n,
            SpanState::Exhausted => {
                return Err(io::Error::new(io::ErrorKind::Other, VolumeAborted))
            }
        };
        self.state = SpanState::AwaitingSwap(next);
        match request(&mut self.provider, next, false) {
            Ok(source) => {
                self.current = Some(source);
                self.state = SpanState::OnVolume(next);
                Ok(())
            }
            Err(err) => {
                self.state = SpanState::Exhausted;
                self.current = None;
                Err(err)
            }
        }
    }
}

fn request<P: VolumeProvider>(
    provider: &mut P,
    number: u32,
    is_first_request: bool,
) -> io::Result<Box<dyn VolumeSource>> {
    loop {
        match provider.request_volume(number, is_first_request)? {
            VolumeAction::Provide(source) => return Ok(source),
            VolumeAction::Retry => continue,
            VolumeAction::Abort => {
                return Err(io::Error::new(io::ErrorKind::Other, VolumeAborted))
            }
        }
    }
}

impl<P: VolumeProvider> Read for SpanReader<P> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let Some(source) = self.current.as_mut() else {
                return Err(io::Error::new(io::ErrorKind::Other, VolumeAborted));
            };
            let n = source.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            // Volume exhausted: swap to the next one. The caller bounds
            // its reads to the archive's data, so running past the final
            // volume only happens on corrupt input and surfaces as the
            // provider's own failure.
            self.advance_volume()?;
        }
    }
}

/// Whether an I/O error came from an aborted volume request.
pub fn is_volume_abort(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<VolumeAborted>())
}

/// Opens sibling volume files next to the volume carrying the
/// directory, deriving each name with [`volume_file_name`].
///
/// Volume zero maps to file number 1, so a final volume named
/// `backup003.zip` serves disks 0..=2 from `backup001.zip` through
/// itself. A missing file aborts the request; interactive callers that
/// want to prompt for media wrap or replace this provider.
pub struct FileVolumes {
    base: PathBuf,
}

impl FileVolumes {
    /// `base` is the path of the volume carrying the directory.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl VolumeProvider for FileVolumes {
    fn request_volume(&mut self, number: u32, _is_first_request: bool) -> io::Result<VolumeAction> {
        let path = volume_file_name(&self.base, number + 1);
        match File::open(&path) {
            Ok(file) => Ok(VolumeAction::Provide(Box::new(file))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(VolumeAction::Abort),
            Err(err) => Err(err),
        }
    }
}

/// Derive the file name of volume `number` from the archive's base name.
///
/// The trailing digit run of the stem is replaced with the zero-padded
/// volume number, keeping the run's width (growing it if the number needs
/// more digits). A stem without a digit run gets a three-digit index
/// appended: `data.zip` becomes `data001.zip`.
pub fn volume_file_name(base: &Path, number: u32) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = base.extension().map(|e| e.to_string_lossy().into_owned());

    let digit_run = stem
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    let (head, run) = stem.split_at(digit_run);
    let width = if run.is_empty() { 3 } else { run.len() };

    let mut name = format!("{head}{number:0width$}");
    if let Some(ext) = extension {
        name.push('.');
        name.push_str(&ext);
    }
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out in-memory volumes and records every request.
    struct TestProvider {
        volumes: Vec<Vec<u8>>,
        requests: Vec<(u32, bool)>,
        abort_at: Option<u32>,
    }

    impl TestProvider {
        fn new(volumes: Vec<Vec<u8>>) -> Self {
            Self {
                volumes,
                requests: Vec::new(),
                abort_at: None,
            }
        }
    }

    impl VolumeProvider for TestProvider {
        fn request_volume(
            &mut self,
            number: u32,
            is_first_request: bool,
        ) -> io::Result<VolumeAction> {
            self.requests.push((number, is_first_request));
            if self.abort_at == Some(number) {
                return Ok(VolumeAction::Abort);
            }
            match self.volumes.get(number as usize) {
                Some(data) => Ok(VolumeAction::Provide(Box::new(Cursor::new(data.clone())))),
                None => Ok(VolumeAction::Abort),
            }
        }
    }

    #[test]
    fn test_reads_across_boundary_with_single_swap() {
        let mut provider = TestProvider::new(vec![b"hello ".to_vec(), b"world".to_vec()]);

        let mut reader = SpanReader::open_at(&mut provider, 0, 0).unwrap();
        let mut out = Vec::new();
        // Bounded read: exactly the logical stream length.
        reader.by_ref().take(11).read_to_end(&mut out).unwrap();

        assert_eq!(out, b"hello world");
        assert_eq!(reader.state(), SpanState::OnVolume(1));
        assert_eq!(provider.requests, vec![(0, true), (1, false)]);
    }

    #[test]
    fn test_open_at_offset_within_volume() {
        let mut provider = TestProvider::new(vec![b"xxhead".to_vec()]);

        let mut reader = SpanReader::open_at(&mut provider, 0, 2).unwrap();
        let mut out = [0u8; 4];
        reader.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"head");
    }

    #[test]
    fn test_abort_marks_exhausted() {
        let mut provider = TestProvider::new(vec![b"only".to_vec()]);
        provider.abort_at = Some(1);

        let mut reader = SpanReader::open_at(&mut provider, 0, 0).unwrap();
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();

        assert!(is_volume_abort(&err));
        assert_eq!(reader.state(), SpanState::Exhausted);
        assert_eq!(out, b"only");
    }

    #[test]
    fn test_retry_then_provide() {
        struct RetryOnce {
            inner: Vec<u8>,
            retried: bool,
        }
        impl VolumeProvider for RetryOnce {
            fn request_volume(&mut self, _n: u32, _first: bool) -> io::Result<VolumeAction> {
                if !self.retried {
                    self.retried = true;
                    return Ok(VolumeAction::Retry);
                }
                Ok(VolumeAction::Provide(Box::new(Cursor::new(
                    self.inner.clone(),
                ))))
            }
        }

        let provider = RetryOnce {
            inner: b"data".to_vec(),
            retried: false,
        };
        let mut reader = SpanReader::open_at(provider, 0, 0).unwrap();
        let mut out = [0u8; 4];
        reader.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"data");
    }

    #[test]
    fn test_volume_file_name_replaces_digit_run() {
        assert_eq!(
            volume_file_name(Path::new("backup001.zip"), 2),
            PathBuf::from("backup002.zip")
        );
        assert_eq!(
            volume_file_name(Path::new("arch9.zip"), 12),
            PathBuf::from("arch12.zip")
        );
    }

    #[test]
    fn test_file_volumes_streams_siblings_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("set003.bin");
        std::fs::write(dir.path().join("set001.bin"), b"first ").unwrap();
        std::fs::write(dir.path().join("set002.bin"), b"second ").unwrap();
        std::fs::write(&base, b"final").unwrap();

        let mut provider = FileVolumes::new(&base);
        let mut reader = SpanReader::open_at(&mut provider, 0, 0).unwrap();
        let mut out = Vec::new();
        // The set has no fourth file, so an unbounded read ends in an
        // abort once all three volumes are drained.
        let err = reader.read_to_end(&mut out).unwrap_err();

        assert!(is_volume_abort(&err));
        assert_eq!(out, b"first second final");
    }

    #[test]
    fn test_volume_file_name_appends_when_no_digits() {
        assert_eq!(
            volume_file_name(Path::new("data.zip"), 1),
            PathBuf::from("data001.zip")
        );
    }
}
