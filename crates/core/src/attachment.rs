//! Attachment validation and uploading.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::BackendObject;
use crate::{Error, Notice, NoticeKind};

/// File extensions the backend accepts, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "ppt", "pptx"];

/// Upload state of an [`Attachment`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AttachmentStatus {
    /// Not uploaded yet.
    #[default]
    Pending,
    /// Uploaded, the remote path is known.
    Uploaded,
    /// The upload failed.
    Failed,
}

/// A local file to be sent along with a query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Attachment {
    path: PathBuf,
    status: AttachmentStatus,
    remote_path: Option<String>,
}

impl Attachment {
    /// Creates a pending attachment for a local file.
    #[inline]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            status: AttachmentStatus::Pending,
            remote_path: None,
        }
    }

    /// Returns the local file path.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the upload state.
    #[inline]
    pub fn status(&self) -> AttachmentStatus {
        self.status
    }

    /// Returns where the backend stored the file, once uploaded.
    #[inline]
    pub fn remote_path(&self) -> Option<&str> {
        self.remote_path.as_deref()
    }

    fn display_name(&self) -> String {
        display_name(&self.path)
    }
}

/// The outcome of [`validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validation {
    /// Attachments to upload, in the order they were given.
    pub accepted: Vec<Attachment>,
    /// Files with an unsupported extension.
    pub rejected: Vec<PathBuf>,
}

impl Validation {
    /// Returns a single notice summarizing all rejected files, if any.
    pub fn rejection_notice(&self) -> Option<Notice> {
        if self.rejected.is_empty() {
            return None;
        }
        let names: Vec<_> =
            self.rejected.iter().map(|p| display_name(p)).collect();
        Some(Notice::new(
            NoticeKind::AttachmentsRejected,
            format!(
                "Unsupported file type, skipped: {} (supported: {})",
                names.join(", "),
                SUPPORTED_EXTENSIONS.join(", ")
            ),
        ))
    }
}

/// Partitions files into accepted attachments and rejected files.
pub fn validate<I, P>(files: I) -> Validation
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut validation = Validation::default();
    for file in files {
        let path = file.into();
        if is_supported(&path) {
            validation.accepted.push(Attachment::new(path));
        } else {
            validation.rejected.push(path);
        }
    }
    validation
}

/// Checks whether the file has one of the [`SUPPORTED_EXTENSIONS`].
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .into_owned()
}

/// Uploads attachment batches, one file at a time.
pub(crate) struct AttachmentPipeline {
    backend: Arc<dyn BackendObject>,
}

impl AttachmentPipeline {
    #[inline]
    pub fn new(backend: Arc<dyn BackendObject>) -> Self {
        Self { backend }
    }

    /// Uploads the attachments in order and returns their remote paths in
    /// the same order.
    ///
    /// The first failure aborts the batch: the remaining attachments stay
    /// pending and no path is returned at all.
    pub async fn upload(
        &self,
        attachments: &mut [Attachment],
    ) -> Result<Vec<String>, Error> {
        let mut remote_paths = Vec::with_capacity(attachments.len());
        for attachment in attachments.iter_mut() {
            trace!("uploading {}", attachment.path.display());
            match self.backend.upload(&attachment.path).await {
                Ok(remote_path) => {
                    attachment.status = AttachmentStatus::Uploaded;
                    attachment.remote_path = Some(remote_path.clone());
                    remote_paths.push(remote_path);
                }
                Err(err) => {
                    warn!(
                        "failed to upload {}, aborting the batch: {err}",
                        attachment.path.display()
                    );
                    attachment.status = AttachmentStatus::Failed;
                    return Err(Error::Upload {
                        file: attachment.display_name(),
                        reason: format!("{err}"),
                    });
                }
            }
        }
        Ok(remote_paths)
    }
}

#[cfg(test)]
mod tests {
    use ched_test_backend::{Call, TestBackend};

    use super::*;
    use crate::backend::AnyBackend;

    #[test]
    fn test_validate() {
        let validation = validate(["a.pdf", "b.exe", "c.pptx"]);
        let accepted: Vec<_> =
            validation.accepted.iter().map(Attachment::path).collect();
        assert_eq!(accepted, [Path::new("a.pdf"), Path::new("c.pptx")]);
        assert_eq!(validation.rejected, [PathBuf::from("b.exe")]);

        let notice = validation.rejection_notice().unwrap();
        assert_eq!(notice.kind(), NoticeKind::AttachmentsRejected);
        assert!(notice.message().contains("b.exe"));
        assert!(!notice.message().contains("a.pdf"));
    }

    #[test]
    fn test_validate_case_insensitive() {
        let validation =
            validate(["/tmp/Syllabus.PDF", "deck.PpTx", "old.Ppt", "README"]);
        assert_eq!(validation.accepted.len(), 3);
        assert_eq!(validation.rejected, [PathBuf::from("README")]);

        let validation = validate(["a.pdf"]);
        assert_eq!(validation.rejection_notice(), None);
    }

    #[tokio::test]
    async fn test_upload_in_order() {
        let backend = TestBackend::default();
        let pipeline =
            AttachmentPipeline::new(Arc::new(AnyBackend(backend.clone())));
        let mut attachments = validate(["c.pptx", "a.pdf", "b.ppt"]).accepted;

        let remote_paths = pipeline.upload(&mut attachments).await.unwrap();
        assert_eq!(
            remote_paths,
            ["uploads/c.pptx", "uploads/a.pdf", "uploads/b.ppt"]
        );
        assert!(
            attachments
                .iter()
                .all(|a| a.status() == AttachmentStatus::Uploaded)
        );
        assert_eq!(attachments[1].remote_path(), Some("uploads/a.pdf"));
    }

    #[tokio::test]
    async fn test_first_failure_aborts_batch() {
        let backend = TestBackend::default();
        backend.fail_upload("b.pdf");
        let pipeline =
            AttachmentPipeline::new(Arc::new(AnyBackend(backend.clone())));
        let mut attachments = validate(["a.pdf", "b.pdf", "c.pptx"]).accepted;

        let err = pipeline.upload(&mut attachments).await.unwrap_err();
        assert!(
            matches!(err, Error::Upload { ref file, .. } if file == "b.pdf")
        );
        assert_eq!(
            backend.calls(),
            [
                Call::Upload(PathBuf::from("a.pdf")),
                Call::Upload(PathBuf::from("b.pdf")),
            ]
        );
        let statuses: Vec<_> =
            attachments.iter().map(Attachment::status).collect();
        assert_eq!(
            statuses,
            [
                AttachmentStatus::Uploaded,
                AttachmentStatus::Failed,
                AttachmentStatus::Pending,
            ]
        );
    }
}
