use memorybook_core::encoder::{EncoderError, OnnxFaceEncoder};
use memorybook_core::{ingest, IngestError, IngestSettings, MatchPolicy, MemoryBook, PendingUpload};
use std::path::Path;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to load models: {0}")]
    Load(#[from] EncoderError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Prepare {
        photo: Vec<u8>,
        settings: IngestSettings,
        book: MemoryBook,
        reply: oneshot::Sender<Result<PendingUpload, IngestError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode, resize, detect, encode and identify an uploaded photo.
    pub async fn prepare(
        &self,
        photo: Vec<u8>,
        settings: IngestSettings,
        book: MemoryBook,
    ) -> Result<PendingUpload, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Prepare {
                photo,
                settings,
                book,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Both ONNX models are loaded before the thread starts, so a missing
/// model fails startup instead of the first upload.
pub fn spawn_engine(
    detector_path: &Path,
    recognizer_path: &Path,
    policy: MatchPolicy,
) -> Result<EngineHandle, EngineError> {
    let mut encoder = OnnxFaceEncoder::load(detector_path, recognizer_path)?;
    tracing::info!(
        detector = %detector_path.display(),
        recognizer = %recognizer_path.display(),
        "face models loaded"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("memorybook-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Prepare {
                        photo,
                        settings,
                        book,
                        reply,
                    } => {
                        let result =
                            ingest::prepare(&photo, settings, &mut encoder, &book, &policy);
                        if let Err(err) = &result {
                            tracing::warn!(error = %err, "upload preparation failed");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
