use super::args::{ParseArgs, Positional};
use crate::cloud::ImageUpload;
use crate::context::CpiContext;
use crate::error::ArgumentError;
use crate::scratch::ScratchFile;
use crate::{CpiError, Result};
use flate2::bufread::GzDecoder;
use serde_json::Value;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

struct CreateStemcellArgs {
    image_path: PathBuf,
    name: String,
}

impl ParseArgs for CreateStemcellArgs {
    fn parse_args(args: &[Value]) -> std::result::Result<Self, ArgumentError> {
        let args = Positional::expect(args, 1)?;
        let image_path = args.string(0, "image_path")?;
        let name = Path::new(image_path)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| ArgumentError::InvalidValue {
                name: "image_path".to_string(),
                value: image_path.to_string(),
            })?;

        Ok(Self {
            image_path: PathBuf::from(image_path),
            name,
        })
    }
}

struct StemcellIdArgs {
    stemcell_id: String,
}

impl ParseArgs for StemcellIdArgs {
    fn parse_args(args: &[Value]) -> std::result::Result<Self, ArgumentError> {
        let args = Positional::expect(args, 1)?;
        Ok(Self {
            stemcell_id: args.string(0, "stemcell_cid")?.to_string(),
        })
    }
}

/// Stemcell images arrive gzipped; the control plane takes the raw image.
fn gunzip(source: &Path, target: &Path) -> std::io::Result<u64> {
    let mut decoder = GzDecoder::new(BufReader::new(std::fs::File::open(source)?));
    let mut output = std::fs::File::create(target)?;
    std::io::copy(&mut decoder, &mut output)
}

async fn decompress_image(source: PathBuf) -> Result<ScratchFile> {
    let image = ScratchFile::new("stemcell-image", ".img")?;
    let target = image.path().to_path_buf();
    let context = format!("Unable to decompress stemcell image '{}'", source.display());

    let bytes = tokio::task::spawn_blocking(move || gunzip(&source, &target))
        .await
        .map_err(|err| CpiError::Internal(format!("Stemcell decompression did not finish: {err}")))?
        .map_err(|err| CpiError::cpi(err, context))?;
    info!("Decompressed stemcell image to {bytes} bytes");
    Ok(image)
}

pub async fn create_stemcell(ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let CreateStemcellArgs { image_path, name } = CreateStemcellArgs::parse_args(args)?;
    info!("CreateStemcell with image_path: '{}'", image_path.display());

    info!("Reading stemcell from disk");
    let image = decompress_image(image_path).await?;
    let file = tokio::fs::File::open(image.path()).await?;

    info!("Beginning stemcell upload");
    let task = ctx.client.create_image(ImageUpload { name, file }).await?;
    Ok(Value::String(task.entity_id().to_string()))
}

pub async fn delete_stemcell(ctx: &CpiContext, args: &[Value]) -> Result<Value> {
    let StemcellIdArgs { stemcell_id } = StemcellIdArgs::parse_args(args)?;
    info!("DeleteStemcell with stemcell_cid: '{stemcell_id}'");

    ctx.client.delete_image(&stemcell_id).await?;
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::{create_stemcell, delete_stemcell};
    use crate::actions::test_support::fixture;
    use crate::error::ErrorKind;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::{json, Value};
    use std::io::Write;
    use std::path::Path;

    fn write_gzipped(path: &Path, content: &[u8]) -> std::io::Result<()> {
        let mut encoder = GzEncoder::new(std::fs::File::create(path)?, Compression::default());
        encoder.write_all(content)?;
        encoder.finish()?;
        Ok(())
    }

    #[tokio::test]
    async fn given_gzipped_image_when_stemcell_created_then_decompressed_image_is_uploaded() -> crate::Result<()> {
        let (cloud, _runner, ctx) = fixture();
        let dir = tempfile::tempdir()?;
        let image = dir.path().join("image.tgz");
        write_gzipped(&image, b"stemcell bytes")?;

        let result = create_stemcell(&ctx, &[json!(image.to_string_lossy())]).await?;

        let image_id = result.as_str().unwrap_or_default();
        assert_eq!(cloud.image_name(image_id).await.as_deref(), Some("image.tgz"));
        assert_eq!(
            cloud.image_content(image_id).await.as_deref(),
            Some(b"stemcell bytes".as_slice())
        );
        Ok(())
    }

    #[tokio::test]
    async fn given_image_that_is_not_gzipped_when_stemcell_created_then_cpi_error_is_returned() -> crate::Result<()> {
        let (cloud, _runner, ctx) = fixture();
        let dir = tempfile::tempdir()?;
        let image = dir.path().join("image.tgz");
        std::fs::write(&image, b"plain bytes, no gzip header")?;

        let result = create_stemcell(&ctx, &[json!(image.to_string_lossy())]).await;

        assert!(result.is_err_and(|e| e.classify() == (ErrorKind::CpiError, false)));
        assert!(cloud.calls().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn given_missing_image_file_when_stemcell_created_then_cpi_error_is_returned() {
        let (cloud, _runner, ctx) = fixture();

        let result = create_stemcell(&ctx, &[json!("/nonexistent/photon-cpi/image.tgz")]).await;

        assert!(result.is_err_and(|e| e.classify() == (ErrorKind::CpiError, false)));
        assert!(cloud.calls().await.is_empty());
    }

    #[tokio::test]
    async fn given_existing_image_when_stemcell_deleted_then_it_is_removed() -> crate::Result<()> {
        let (cloud, _runner, ctx) = fixture();
        cloud.insert_image("image-1", "image.tgz").await;

        assert_eq!(delete_stemcell(&ctx, &[json!("image-1")]).await?, Value::Null);
        assert!(cloud.image_name("image-1").await.is_none());
        Ok(())
    }
}
