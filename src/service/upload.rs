use std::fmt;
use std::path::Path;
use std::pin::pin;

use actix_multipart::Multipart;
use actix_web::web::Bytes;
use actix_web::{web, HttpMessage, HttpRequest};
use futures_util::{Stream, StreamExt, TryStreamExt};
use uuid::Uuid;

use crate::answers::RawSubmission;
use crate::sql_server::StoredImage;

/// 提交中附带的图片，尚未写入磁盘
pub(crate) struct UploadedImage {
    pub(crate) filename: Option<String>,
    pub(crate) bytes: Vec<u8>,
}

/// 按Content-Type读取提交内容。读取出错或请求体超过limit字节时放弃全部内容，
/// 按没有作答处理
pub(crate) async fn read_submission(
    req: &HttpRequest,
    payload: web::Payload,
    limit: usize,
) -> (RawSubmission, Option<UploadedImage>) {
    let mut submission = RawSubmission::default();
    let mut budget = limit;
    match req.content_type() {
        "multipart/form-data" => {
            let mut multipart = Multipart::new(req.headers(), payload);
            let mut image = None;
            while let Ok(Some(field)) = multipart.try_next().await {
                let name = field.name().unwrap_or_default().to_string();
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(str::to_string);
                let Some(bytes) = read_limited(field, &mut budget).await else {
                    return (RawSubmission::default(), None);
                };
                match name.as_str() {
                    // 带文件名的answers是上传的json文件
                    "answers" if filename.is_some() => submission.answers_file = Some(bytes),
                    "answers" => submission.answers_field = String::from_utf8(bytes).ok(),
                    "image" => image = Some(UploadedImage { filename, bytes }),
                    other => log::debug!("忽略未知的表单字段: {}", other),
                }
            }
            return (submission, image);
        }
        "application/x-www-form-urlencoded" => {
            if let Some(body) = read_limited(payload, &mut budget).await {
                submission.answers_field = url::form_urlencoded::parse(&body)
                    .find(|(key, _)| key == "answers")
                    .map(|(_, value)| value.into_owned());
            }
        }
        _ => {
            if let Some(body) = read_limited(payload, &mut budget).await {
                submission.body = match serde_json::from_slice(&body) {
                    Ok(json) => Some(json),
                    Err(e) => {
                        log::debug!("请求体不是合法json: {}", e);
                        None
                    }
                };
            }
        }
    }
    (submission, None)
}

/// 读完整个流，累计超过剩余budget或读取出错时返回None
async fn read_limited<S, E>(stream: S, budget: &mut usize) -> Option<Vec<u8>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
{
    let mut stream = pin!(stream);
    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                if chunk.len() > *budget {
                    log::warn!("提交的请求体超过大小上限，忽略全部内容");
                    return None;
                }
                *budget -= chunk.len();
                data.extend_from_slice(&chunk);
            }
            Err(e) => {
                log::warn!("读取请求体时出错: {}", e);
                return None;
            }
        }
    }
    Some(data)
}

/// 把图片写到answers目录，失败时记录日志并当作没有上传
pub(crate) async fn save_image(answers_dir: &Path, image: UploadedImage) -> Option<StoredImage> {
    let extension = image
        .filename
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string());
    let file_name = format!("{}.{}", Uuid::new_v4(), extension);

    if let Err(e) = tokio::fs::create_dir_all(answers_dir).await {
        log::warn!("创建图片目录{}失败: {}", answers_dir.display(), e);
        return None;
    }
    match tokio::fs::write(answers_dir.join(&file_name), &image.bytes).await {
        Ok(()) => Some(StoredImage {
            path: format!("answers/{}", file_name),
            size: image.bytes.len() as i64,
        }),
        Err(e) => {
            log::warn!("保存答题图片失败: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;

    use futures_util::stream;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        stream::iter(parts.iter().map(|part| Ok::<_, io::Error>(Bytes::from_static(*part))).collect::<Vec<_>>())
    }

    #[actix_web::test]
    async fn body_within_budget_is_read_whole() {
        let mut budget = 8;
        let body = read_limited(chunks(&[b"abc", b"defgh"]), &mut budget).await;
        assert_eq!(body.as_deref(), Some(&b"abcdefgh"[..]));
        assert_eq!(budget, 0);
    }

    #[actix_web::test]
    async fn body_over_budget_is_dropped() {
        let mut budget = 5;
        assert!(read_limited(chunks(&[b"abc", b"def"]), &mut budget).await.is_none());

        // 预算在同一请求的多个字段间共享
        let mut budget = 6;
        assert!(read_limited(chunks(&[b"abcd"]), &mut budget).await.is_some());
        assert!(read_limited(chunks(&[b"efg"]), &mut budget).await.is_none());
    }

    #[actix_web::test]
    async fn stream_error_is_dropped() {
        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"{")),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection reset")),
        ]);
        let mut budget = 1024;
        assert!(read_limited(failing, &mut budget).await.is_none());
    }

    #[actix_web::test]
    async fn image_keeps_a_safe_extension() {
        let dir = std::env::temp_dir().join(format!("quiz_upload_test_{}", std::process::id()));
        let stored = save_image(
            &dir,
            UploadedImage {
                filename: Some("Cat.PNG".to_string()),
                bytes: vec![1, 2, 3],
            },
        )
        .await
        .unwrap();
        assert!(stored.path.starts_with("answers/"));
        assert!(stored.path.ends_with(".png"));
        assert_eq!(stored.size, 3);

        let stored = save_image(
            &dir,
            UploadedImage {
                filename: Some("../../etc/passwd".to_string()),
                bytes: Vec::new(),
            },
        )
        .await
        .unwrap();
        assert!(stored.path.ends_with(".bin"));
        assert_eq!(stored.size, 0);
    }
}
