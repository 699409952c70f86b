//! 전송 디코더 -- 요청 본문의 Content-Encoding 해제
//!
//! 알림 의미에 대해서는 아무것도 알지 못하며, 압축을 벗긴 원시 바이트만 반환합니다.
//! 압축 해제 결과는 `max_decompressed_bytes`로 제한하여 압축 폭탄을 차단합니다.

use std::io::Read;

use bytes::Bytes;
use flate2::read::MultiGzDecoder;

use crate::error::IngestError;

/// 요청 본문 인코딩
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    /// 압축 없음 (헤더 없음, 빈 값, `identity`)
    Identity,
    /// gzip (`gzip`, `x-gzip`)
    Gzip,
}

impl ContentEncoding {
    /// `Content-Encoding` 헤더 값을 해석합니다.
    ///
    /// 대소문자와 앞뒤 공백은 무시합니다.
    pub fn from_header(value: Option<&str>) -> Result<Self, IngestError> {
        let Some(raw) = value else {
            return Ok(Self::Identity);
        };

        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Ok(Self::Identity),
            "gzip" | "x-gzip" => Ok(Self::Gzip),
            other => Err(IngestError::UnsupportedEncoding(other.to_owned())),
        }
    }

    /// 인코딩 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
        }
    }
}

/// 전송 디코더
#[derive(Debug, Clone)]
pub struct TransportDecoder {
    /// 압축 해제 후 최대 크기 (바이트)
    max_decompressed_bytes: usize,
}

impl TransportDecoder {
    /// 새 디코더를 생성합니다.
    pub fn new(max_decompressed_bytes: usize) -> Self {
        Self {
            max_decompressed_bytes,
        }
    }

    /// 본문을 디코딩합니다.
    ///
    /// `Identity`는 입력을 그대로 반환하고, `Gzip`은 전체를 메모리로 압축 해제합니다.
    /// 여러 gzip 멤버가 이어진 본문은 모든 멤버를 순서대로 이어 붙입니다 (RFC 1952 2.2).
    ///
    /// # Errors
    /// - 빈 gzip 본문, 잘린 스트림, 유효하지 않은 gzip 헤더, 멤버 뒤의 잉여 바이트 → [`IngestError::Decode`]
    /// - 압축 해제 결과가 제한 초과 → [`IngestError::BodyTooLarge`]
    pub fn decode(&self, body: Bytes, encoding: ContentEncoding) -> Result<Bytes, IngestError> {
        match encoding {
            ContentEncoding::Identity => {
                if body.len() > self.max_decompressed_bytes {
                    return Err(IngestError::BodyTooLarge {
                        max: self.max_decompressed_bytes,
                    });
                }
                Ok(body)
            }
            ContentEncoding::Gzip => self.gunzip(&body).map(Bytes::from),
        }
    }

    fn gunzip(&self, body: &[u8]) -> Result<Vec<u8>, IngestError> {
        if body.is_empty() {
            return Err(decode_error("empty gzip stream"));
        }

        // 제한보다 1바이트 더 읽어서 초과 여부를 판단
        let limit = self.max_decompressed_bytes as u64 + 1;
        let mut decoder = MultiGzDecoder::new(body).take(limit);
        let mut out = Vec::with_capacity(body.len().saturating_mul(4).min(self.max_decompressed_bytes));

        decoder
            .read_to_end(&mut out)
            .map_err(|e| decode_error(&e.to_string()))?;

        if out.len() > self.max_decompressed_bytes {
            return Err(IngestError::BodyTooLarge {
                max: self.max_decompressed_bytes,
            });
        }

        Ok(out)
    }
}

fn decode_error(reason: &str) -> IngestError {
    IngestError::Decode {
        encoding: ContentEncoding::Gzip.as_str().to_owned(),
        reason: reason.to_owned(),
    }
}
