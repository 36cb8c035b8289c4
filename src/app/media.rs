use std::io::Cursor;

use anyhow::{anyhow, Result};
use aws_sdk_s3::primitives::ByteStream;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use sqlx::Row;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::media::Media;
use crate::infra::{db::Db, storage::ObjectStorage};

#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    pub max_bytes: usize,
    pub max_width: u32,
    pub max_height: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
}

impl UploadOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_bytes: config.upload_max_bytes,
            max_width: config.upload_max_width,
            max_height: config.upload_max_height,
            thumbnail_width: config.thumbnail_width,
            thumbnail_height: config.thumbnail_height,
        }
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1000 * 1024 + 1,
            max_width: 6000,
            max_height: 3000,
            thumbnail_width: 150,
            thumbnail_height: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRejection {
    Empty,
    TooLarge,
    DimensionsTooLarge,
    UnsupportedFormat,
    Undecodable,
}

impl std::fmt::Display for ImageRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::Empty => "no file was uploaded",
            Self::TooLarge => "file too large",
            Self::DimensionsTooLarge => "file dimensions are too large",
            Self::UnsupportedFormat => "invalid file format",
            Self::Undecodable => "invalid image",
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub format: ImageFormat,
    pub original: Vec<u8>,
    pub thumbnail: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ProcessedImage {
    pub fn extension(&self) -> &'static str {
        extension_for(self.format)
    }

    pub fn content_type(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            _ => "image/jpeg",
        }
    }
}

/// Decodes an uploaded image, checks it fits the configured bounds and
/// renders a cropped thumbnail. Both variants keep the upload's format.
pub fn process_image(data: &[u8], options: &UploadOptions) -> Result<ProcessedImage, ImageRejection> {
    if data.is_empty() {
        return Err(ImageRejection::Empty);
    }
    if data.len() > options.max_bytes {
        return Err(ImageRejection::TooLarge);
    }

    let format = image::guess_format(data).map_err(|_| ImageRejection::UnsupportedFormat)?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif) {
        return Err(ImageRejection::UnsupportedFormat);
    }

    let decoded = image::load_from_memory_with_format(data, format)
        .map_err(|_| ImageRejection::Undecodable)?;

    let (width, height) = decoded.dimensions();
    if width > options.max_width || height > options.max_height {
        return Err(ImageRejection::DimensionsTooLarge);
    }

    let thumbnail = decoded.resize_to_fill(
        options.thumbnail_width,
        options.thumbnail_height,
        FilterType::Lanczos3,
    );

    Ok(ProcessedImage {
        format,
        original: encode(&decoded, format).map_err(|_| ImageRejection::Undecodable)?,
        thumbnail: encode(&thumbnail, format).map_err(|_| ImageRejection::Undecodable)?,
        width,
        height,
    })
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut buffer, format)?,
        ImageFormat::Gif => DynamicImage::ImageRgba8(image.to_rgba8()).write_to(&mut buffer, format)?,
        _ => image.write_to(&mut buffer, format)?,
    }
    Ok(buffer.into_inner())
}

fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        _ => "jpg",
    }
}

#[derive(Clone)]
pub struct MediaService {
    db: Db,
    storage: ObjectStorage,
}

impl MediaService {
    pub fn new(db: Db, storage: ObjectStorage) -> Self {
        Self { db, storage }
    }

    /// Stores both variants of an already processed image and records the
    /// media row.
    pub async fn store_photo(&self, owner_id: Uuid, image: ProcessedImage) -> Result<Media> {
        let media_id = Uuid::new_v4();
        let ext = image.extension();
        let original_key = format!("photos/{}/{}/original.{}", owner_id, media_id, ext);
        let thumb_key = format!("photos/{}/{}/thumb.{}", owner_id, media_id, ext);
        let content_type = image.content_type();
        let bytes = image.original.len() as i64;

        self.put_object(&original_key, content_type, image.original)
            .await?;
        self.put_object(&thumb_key, content_type, image.thumbnail)
            .await?;

        let url = self.storage.public_url(&original_key);
        let thumbnail_url = self.storage.public_url(&thumb_key);

        let row = sqlx::query(
            "INSERT INTO media (id, owner_id, original_key, thumb_key, url, thumbnail_url, width, height, bytes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING created_at",
        )
        .bind(media_id)
        .bind(owner_id)
        .bind(&original_key)
        .bind(&thumb_key)
        .bind(&url)
        .bind(&thumbnail_url)
        .bind(image.width as i32)
        .bind(image.height as i32)
        .bind(bytes)
        .fetch_one(self.db.pool())
        .await?;

        tracing::info!(media_id = %media_id, owner_id = %owner_id, "photo stored");

        Ok(Media {
            id: media_id,
            owner_id,
            original_key,
            thumb_key,
            url,
            thumbnail_url,
            width: image.width as i32,
            height: image.height as i32,
            bytes,
            created_at: row.get("created_at"),
        })
    }

    async fn put_object(&self, key: &str, content_type: &str, body: Vec<u8>) -> Result<()> {
        self.storage
            .client()
            .put_object()
            .bucket(self.storage.bucket())
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| anyhow!("failed to upload {}: {}", key, err))?;
        Ok(())
    }
}
