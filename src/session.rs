//! The per-user session: the Source and Result slots and the handles bound to them.
//!
//! A session is passed explicitly to every stage of the pipeline. It is the only
//! place that asks the [`HandleRegistry`] to allocate or revoke, and it tags each
//! transform with a [`Ticket`] so that a slow completion can never overwrite the
//! result of a newer one.

use crate::download::{build_file_name, trigger_download};
use crate::error::{
    CompressionError, ConversionError, DownloadError, RemoteServiceError, TransformError,
};
use crate::formats::TargetFormat;
use crate::handles::{HandleRegistry, ReferenceHandle};
use crate::ingest::IngestedSource;
use crate::utils::SizeReport;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The uploaded image currently installed in the Source slot
#[derive(Debug, Clone)]
pub struct SourceAsset {
    pub bytes: Arc<[u8]>,
    pub mime: String,
    pub file_name: String,
    /// File name with directories and the last extension stripped
    pub base_name: String,
    pub handle: ReferenceHandle,
}

impl SourceAsset {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Bytes produced by an engine, before they are bound to a handle
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub extension: String,
    pub dimensions: Option<(u32, u32)>,
}

/// The transform output currently installed in the Result slot
#[derive(Debug, Clone)]
pub struct ResultAsset {
    pub bytes: Arc<[u8]>,
    pub mime: String,
    pub extension: String,
    pub dimensions: Option<(u32, u32)>,
    pub handle: ReferenceHandle,
    pub output_name: String,
}

impl ResultAsset {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformRequest {
    Convert { target: TargetFormat },
    Compress { quality: f32 },
    RemoveBackground,
}

impl TransformRequest {
    /// The error a request reports when the session has no source image
    pub fn no_input_error(&self) -> TransformError {
        match self {
            TransformRequest::Convert { .. } => ConversionError::NoInput.into(),
            TransformRequest::Compress { .. } => CompressionError::NoInput.into(),
            TransformRequest::RemoveBackground => RemoteServiceError::NoInput.into(),
        }
    }
}

impl fmt::Display for TransformRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformRequest::Convert { target } => write!(f, "convert to {}", target),
            TransformRequest::Compress { quality } => write!(f, "compress at {:.2}", quality),
            TransformRequest::RemoveBackground => f.write_str("remove background"),
        }
    }
}

/// A submitted request, tagged with its place in the session's ordering
#[derive(Debug, Clone)]
pub struct Ticket {
    pub seq: u64,
    /// Which upload the request was issued against
    pub epoch: u64,
    pub request: TransformRequest,
    pub source: SourceAsset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The result was installed in the Result slot
    Applied,
    /// A newer request or a newer upload got there first; the result was dropped
    Stale,
}

#[derive(Debug)]
pub struct Session {
    handles: HandleRegistry,
    source: Option<SourceAsset>,
    result: Option<ResultAsset>,
    output_name: Option<String>,
    source_epoch: u64,
    next_seq: u64,
    applied_seq: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_registry(HandleRegistry::new())
    }

    /// Builds a session around an existing handle table.
    ///
    /// The table may be shared with other sessions. Teardown releases only
    /// this session's handles while another clone is alive.
    pub fn with_registry(handles: HandleRegistry) -> Self {
        Self {
            handles,
            source: None,
            result: None,
            output_name: None,
            source_epoch: 0,
            next_seq: 1,
            applied_seq: 0,
        }
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn source(&self) -> Option<&SourceAsset> {
        self.source.as_ref()
    }

    pub fn result(&self) -> Option<&ResultAsset> {
        self.result.as_ref()
    }

    /// Installs a new upload, superseding the old source and any result derived from it
    pub fn install_source(&mut self, ingested: IngestedSource) -> &SourceAsset {
        let handle = self.handles.replace(
            self.source.as_ref().map(|s| &s.handle),
            Arc::clone(&ingested.bytes),
            &ingested.mime,
        );
        if let Some(stale) = self.result.take() {
            self.handles.revoke(&stale.handle);
        }
        self.output_name = None;
        self.source_epoch += 1;

        debug!(
            file = %ingested.file_name,
            epoch = self.source_epoch,
            normalized = ingested.normalized,
            "installed source"
        );
        self.source.insert(SourceAsset {
            bytes: ingested.bytes,
            mime: ingested.mime,
            file_name: ingested.file_name,
            base_name: ingested.base_name,
            handle,
        })
    }

    /// Issues a ticket for `request` against the current source
    pub fn begin(&mut self, request: TransformRequest) -> Result<Ticket, TransformError> {
        let source = self
            .source
            .clone()
            .ok_or_else(|| request.no_input_error())?;
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(seq, epoch = self.source_epoch, %request, "began transform");
        Ok(Ticket {
            seq,
            epoch: self.source_epoch,
            request,
            source,
        })
    }

    /// Installs the output of a ticketed request unless something newer already landed
    pub fn complete(&mut self, ticket: &Ticket, encoded: EncodedImage) -> Completion {
        if ticket.epoch != self.source_epoch || ticket.seq <= self.applied_seq {
            warn!(
                seq = ticket.seq,
                applied = self.applied_seq,
                epoch = ticket.epoch,
                current_epoch = self.source_epoch,
                request = %ticket.request,
                "discarding stale completion"
            );
            return Completion::Stale;
        }

        let bytes: Arc<[u8]> = Arc::from(encoded.bytes);
        let handle = self.handles.replace(
            self.result.as_ref().map(|r| &r.handle),
            Arc::clone(&bytes),
            &encoded.mime,
        );
        let output_name = self
            .output_name
            .clone()
            .unwrap_or_else(|| ticket.source.base_name.clone());

        info!(
            seq = ticket.seq,
            request = %ticket.request,
            size = bytes.len(),
            mime = %encoded.mime,
            "transform applied"
        );
        self.applied_seq = ticket.seq;
        self.result = Some(ResultAsset {
            bytes,
            mime: encoded.mime,
            extension: encoded.extension,
            dimensions: encoded.dimensions,
            handle,
            output_name,
        });
        Completion::Applied
    }

    /// Sizes of the current source and result, once a result exists
    pub fn size_report(&self) -> Option<SizeReport> {
        let source = self.source.as_ref()?;
        let result = self.result.as_ref()?;
        Some(SizeReport::new(source.size(), result.size()))
    }

    /// Sets the user-chosen output base name; blank names fall back at download time
    pub fn set_output_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if let Some(result) = self.result.as_mut() {
            result.output_name = name.clone();
        }
        self.output_name = Some(name);
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output_name.as_deref()
    }

    /// Saves the current result into `dir` and returns the written path
    pub fn download(&self, dir: &Path) -> Result<PathBuf, DownloadError> {
        let result = self.result.as_ref().ok_or(DownloadError::NoResult)?;
        let default_name = self
            .source
            .as_ref()
            .map(|s| s.base_name.as_str())
            .unwrap_or_default();
        let file_name = build_file_name(&result.output_name, default_name, &result.extension);
        trigger_download(&self.handles, Some(result), dir, &file_name)
    }

    /// Revokes every handle the session holds and empties both slots.
    ///
    /// Handles outside the slots are swept only when no other clone of the
    /// table is alive; a shared table keeps them for their owners.
    pub fn teardown(&mut self) -> usize {
        let mut revoked = 0;
        if let Some(result) = self.result.take() {
            revoked += usize::from(self.handles.revoke(&result.handle));
        }
        if let Some(source) = self.source.take() {
            revoked += usize::from(self.handles.revoke(&source.handle));
        }
        if self.handles.is_shared() {
            return revoked;
        }
        let leaked = self.handles.revoke_all();
        if leaked > 0 {
            warn!(leaked, "revoked handles not owned by any slot");
        }
        revoked + leaked
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let revoked = self.teardown();
        debug!(revoked, "session dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingested(name: &str, bytes: &[u8]) -> IngestedSource {
        IngestedSource {
            bytes: Arc::from(bytes),
            mime: "image/png".to_string(),
            file_name: name.to_string(),
            base_name: crate::formats::base_name(name),
            normalized: false,
        }
    }

    fn encoded(tag: u8) -> EncodedImage {
        EncodedImage {
            bytes: vec![tag; 4],
            mime: "image/jpeg".to_string(),
            extension: "jpg".to_string(),
            dimensions: Some((2, 2)),
        }
    }

    const CONVERT: TransformRequest = TransformRequest::Convert {
        target: TargetFormat::Jpeg,
    };

    #[test]
    fn test_begin_without_source() {
        let mut session = Session::new();
        assert!(matches!(
            session.begin(CONVERT),
            Err(TransformError::Conversion(ConversionError::NoInput))
        ));
        assert!(matches!(
            session.begin(TransformRequest::Compress { quality: 0.5 }),
            Err(TransformError::Compression(CompressionError::NoInput))
        ));
        assert!(matches!(
            session.begin(TransformRequest::RemoveBackground),
            Err(TransformError::Remote(RemoteServiceError::NoInput))
        ));
    }

    #[test]
    fn test_install_source_replaces_handle() {
        let mut session = Session::new();
        let first = session.install_source(ingested("a.png", b"a")).handle.clone();
        let second = session.install_source(ingested("b.png", b"b")).handle.clone();

        assert!(!session.handles().is_live(&first));
        assert!(session.handles().is_live(&second));
        assert_eq!(session.handles().live_count(), 1);
    }

    #[test]
    fn test_result_defaults_to_source_base_name() {
        let mut session = Session::new();
        session.install_source(ingested("dir/holiday.png", b"a"));
        let ticket = session.begin(CONVERT).unwrap();

        assert_eq!(session.complete(&ticket, encoded(1)), Completion::Applied);
        let result = session.result().unwrap();
        assert_eq!(result.output_name, "holiday");
        assert_eq!(result.size(), 4);
        assert_eq!(session.size_report(), Some(SizeReport::new(1, 4)));
        assert_eq!(session.handles().live_count(), 2);
    }

    #[test]
    fn test_older_completion_is_stale() {
        let mut session = Session::new();
        session.install_source(ingested("a.png", b"a"));
        let slow = session.begin(CONVERT).unwrap();
        let fast = session.begin(TransformRequest::Compress { quality: 0.5 }).unwrap();

        assert_eq!(session.complete(&fast, encoded(2)), Completion::Applied);
        assert_eq!(session.complete(&slow, encoded(1)), Completion::Stale);
        assert_eq!(&*session.result().unwrap().bytes, &[2u8; 4]);
        assert_eq!(session.handles().live_count(), 2);
    }

    #[test]
    fn test_completion_for_superseded_upload_is_stale() {
        let mut session = Session::new();
        session.install_source(ingested("a.png", b"a"));
        let ticket = session.begin(CONVERT).unwrap();
        session.install_source(ingested("b.png", b"b"));

        assert_eq!(session.complete(&ticket, encoded(1)), Completion::Stale);
        assert!(session.result().is_none());
        assert_eq!(session.handles().live_count(), 1);
    }

    #[test]
    fn test_set_output_name_updates_result() {
        let mut session = Session::new();
        session.install_source(ingested("a.png", b"a"));
        session.set_output_name("renamed");
        let ticket = session.begin(CONVERT).unwrap();
        session.complete(&ticket, encoded(1));
        assert_eq!(session.result().unwrap().output_name, "renamed");

        session.set_output_name("again");
        assert_eq!(session.result().unwrap().output_name, "again");
        assert_eq!(session.output_name(), Some("again"));
    }

    #[test]
    fn test_download_without_result() {
        let session = Session::new();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            session.download(dir.path()),
            Err(DownloadError::NoResult)
        ));
    }

    #[test]
    fn test_drop_revokes_everything() {
        let registry = HandleRegistry::new();
        {
            let mut session = Session::with_registry(registry.clone());
            session.install_source(ingested("a.png", b"a"));
            let ticket = session.begin(CONVERT).unwrap();
            session.complete(&ticket, encoded(1));
            assert_eq!(registry.live_count(), 2);
        }
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_dropping_one_session_spares_a_sibling() {
        let registry = HandleRegistry::new();
        let mut survivor = Session::with_registry(registry.clone());
        survivor.install_source(ingested("keep.png", b"k"));
        let ticket = survivor.begin(CONVERT).unwrap();
        survivor.complete(&ticket, encoded(7));

        {
            let mut other = Session::with_registry(registry.clone());
            other.install_source(ingested("gone.png", b"g"));
            assert_eq!(registry.live_count(), 3);
        }

        assert_eq!(registry.live_count(), 2);
        assert!(registry.is_live(&survivor.source().unwrap().handle));
        let dir = tempfile::tempdir().unwrap();
        let path = survivor.download(dir.path()).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), vec![7; 4]);
    }

    #[test]
    fn test_teardown_sweeps_strays_on_private_table() {
        let mut session = Session::new();
        session.install_source(ingested("a.png", b"a"));
        session.handles().allocate(Arc::from(&b"stray"[..]), "image/png");

        assert_eq!(session.teardown(), 2);
        assert_eq!(session.handles().live_count(), 0);
    }
}
