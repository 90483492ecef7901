//! 로그 콘텐츠 소스 — 오브젝트 스토리지 협력자 인터페이스
//!
//! 업로드된 파일의 실제 바이트는 외부 협력자(오브젝트 스토리지)가
//! 소유합니다. 파이프라인은 이 trait을 통해서만 내용을 읽습니다.
//! [`FsContentSource`]는 로컬 디렉토리 구현입니다.

use std::path::PathBuf;

use logward_core::BoxFuture;
use logward_core::error::ContentError;
use logward_core::types::Upload;

/// 업로드 콘텐츠 읽기 계약
pub trait LogContentSource: Send + Sync {
    /// 업로드의 전체 텍스트 내용을 읽습니다.
    fn read<'a>(&'a self, upload: &'a Upload) -> BoxFuture<'a, Result<String, ContentError>>;
}

/// 파일 시스템 콘텐츠 소스
///
/// `<root>/<upload_id>` 경로의 파일을 읽습니다.
pub struct FsContentSource {
    root: PathBuf,
    max_bytes: u64,
}

impl FsContentSource {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }
}

impl LogContentSource for FsContentSource {
    fn read<'a>(&'a self, upload: &'a Upload) -> BoxFuture<'a, Result<String, ContentError>> {
        Box::pin(async move {
            let path = self.root.join(&upload.id);

            let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ContentError::NotFound {
                        upload_id: upload.id.clone(),
                    }
                } else {
                    ContentError::Read {
                        upload_id: upload.id.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

            if metadata.len() > self.max_bytes {
                return Err(ContentError::TooLarge {
                    size: metadata.len(),
                    max: self.max_bytes,
                });
            }

            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| ContentError::Read {
                    upload_id: upload.id.clone(),
                    reason: e.to_string(),
                })
        })
    }
}
