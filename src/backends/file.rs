//! Backend appending messages to a log file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::console::framed;
use super::{BackendContext, EmailBackend, Opened};
use crate::errors::{MailError, MailResult};
use crate::message::EmailMessage;

/// Writes messages to `<dir>/<YYYYmmdd-HHMMSS>-<uuid>.log`.
///
/// The file name is picked on the first open and kept for the lifetime of
/// the backend, so reopening appends to the same file.
#[derive(Debug)]
pub struct FileBackend {
    directory: PathBuf,
    filename: Option<PathBuf>,
    stream: Option<File>,
    fail_silently: bool,
}

impl FileBackend {
    /// Creates a backend for the directory in the context's options or
    /// settings, creating it when missing.
    pub fn new(ctx: &BackendContext) -> MailResult<Self> {
        let directory = ctx
            .options
            .file_path
            .clone()
            .or_else(|| ctx.settings.file_path.clone())
            .ok_or_else(|| {
                MailError::configuration("The file backend requires a file_path setting")
            })?;
        let mut backend = Self::with_directory(directory)?;
        backend.fail_silently = ctx.options.fail_silently;
        Ok(backend)
    }

    /// Creates a backend writing into `directory`.
    pub fn with_directory(directory: impl Into<PathBuf>) -> MailResult<Self> {
        let directory = directory.into();
        prepare_directory(&directory)?;
        Ok(Self {
            directory,
            filename: None,
            stream: None,
            fail_silently: false,
        })
    }

    /// Returns the output directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn filename(&mut self) -> PathBuf {
        self.filename
            .get_or_insert_with(|| {
                let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
                self.directory
                    .join(format!("{}-{}.log", timestamp, uuid::Uuid::new_v4().simple()))
            })
            .clone()
    }
}

fn prepare_directory(directory: &Path) -> MailResult<()> {
    if directory.exists() && !directory.is_dir() {
        return Err(MailError::configuration(format!(
            "Path for saving email messages exists, but is not a directory: {}",
            directory.display()
        )));
    }

    std::fs::create_dir_all(directory).map_err(|e| {
        MailError::configuration(format!(
            "Could not create directory for saving email messages: {}",
            directory.display()
        ))
        .with_cause(e)
    })?;

    let metadata = std::fs::metadata(directory).map_err(|e| {
        MailError::configuration(format!("Could not inspect {}", directory.display())).with_cause(e)
    })?;
    if metadata.permissions().readonly() {
        return Err(MailError::configuration(format!(
            "Could not write to directory: {}",
            directory.display()
        )));
    }
    Ok(())
}

#[async_trait]
impl EmailBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn fail_silently(&self) -> bool {
        self.fail_silently
    }

    async fn open(&mut self) -> MailResult<Opened> {
        if self.stream.is_some() {
            return Ok(Opened::AlreadyOpen);
        }

        let path = self.filename();
        match OpenOptions::new().create(true).append(true).open(&path).await {
            Ok(file) => {
                tracing::debug!(path = %path.display(), "Opened mail log file");
                self.stream = Some(file);
                Ok(Opened::Created)
            }
            Err(e) if self.fail_silently => {
                tracing::warn!(path = %path.display(), error = %e, "Suppressed file open failure");
                Ok(Opened::Suppressed)
            }
            Err(e) => Err(MailError::io(format!("Failed to open {}", path.display()), e)),
        }
    }

    async fn close(&mut self) -> MailResult<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        match stream.flush().await {
            Err(e) if !self.fail_silently => Err(MailError::io("Failed to flush mail log file", e)),
            _ => Ok(()),
        }
    }

    async fn deliver(&mut self, message: &EmailMessage) -> MailResult<bool> {
        let bytes = framed(message)?;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MailError::configuration("File backend is not open"))?;
        stream
            .write_all(&bytes)
            .await
            .map_err(|e| MailError::io("Failed to write message to file", e))?;
        Ok(true)
    }

    fn output_path(&self) -> Option<PathBuf> {
        self.filename.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailSettings;
    use crate::errors::MailErrorKind;
    use std::sync::Arc;

    fn message() -> EmailMessage {
        let settings = Arc::new(MailSettings::builder().no_tls().build().unwrap());
        EmailMessage::builder(settings)
            .subject("Subject")
            .body("Content")
            .from_email("from@example.com")
            .to(["to@example.com"])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::with_directory(dir.path().join("mail")).unwrap();

        assert_eq!(backend.send_messages(&[message(), message()]).await.unwrap(), 2);

        let path = backend.output_path().unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.ends_with(".log"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("To: to@example.com").count(), 2);
        assert_eq!(std::fs::read_dir(dir.path().join("mail")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::with_directory(dir.path()).unwrap();

        assert_eq!(backend.open().await.unwrap(), Opened::Created);
        assert_eq!(backend.open().await.unwrap(), Opened::AlreadyOpen);
        backend.close().await.unwrap();
        backend.close().await.unwrap();
    }

    #[test]
    fn test_path_is_a_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = FileBackend::with_directory(file.path()).unwrap_err();
        assert_eq!(err.kind(), MailErrorKind::ConfigurationInvalid);
    }
}
