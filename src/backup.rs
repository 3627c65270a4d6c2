use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/schoold.sqlite3";
const META_WORKSPACE_ENTRY: &str = "meta/workspace.json";
const DB_FILE: &str = "schoold.sqlite3";
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
pub const BUNDLE_FORMAT_V1: &str = "schoold-workspace-v1";
pub const PLAIN_SQLITE_FORMAT: &str = "sqlite3";

/// `manifest.json` at the root of a workspace bundle.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleManifest {
    format: String,
    version: u32,
    app_version: String,
    exported_at: String,
    db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn write_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
) -> anyhow::Result<()> {
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name, opts)
        .with_context(|| format!("failed to start bundle entry {}", name))?;
    zip.write_all(bytes)
        .with_context(|| format!("failed to write bundle entry {}", name))
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> anyhow::Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("bundle missing {}", name))?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .with_context(|| format!("failed to read bundle entry {}", name))?;
    Ok(bytes)
}

/// Packs the workspace database into a zip bundle with a digest manifest.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.display());
    }
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.display()))?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create bundle {}", out_path.display()))?;

    let manifest = BundleManifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        version: 1,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: Utc::now().to_rfc3339(),
        db_sha256: sha256_hex(&db_bytes),
    };
    let workspace_meta = serde_json::json!({
        "sourceWorkspace": workspace_path.to_string_lossy(),
    });

    let mut zip = ZipWriter::new(out_file);
    write_entry(&mut zip, MANIFEST_ENTRY, &serde_json::to_vec_pretty(&manifest)?)?;
    write_entry(&mut zip, DB_ENTRY, &db_bytes)?;
    write_entry(
        &mut zip,
        META_WORKSPACE_ENTRY,
        &serde_json::to_vec_pretty(&workspace_meta)?,
    )?;
    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: manifest.format,
        entry_count: 3,
        db_sha256: manifest.db_sha256,
    })
}

/// A validated database waiting next to the workspace database. Dropping it
/// without `commit` removes the staged file.
#[derive(Debug)]
pub struct StagedImport {
    tmp: PathBuf,
    dst: PathBuf,
    format: String,
    committed: bool,
}

impl StagedImport {
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Replaces the workspace database with the staged copy.
    pub fn commit(mut self) -> anyhow::Result<ImportSummary> {
        std::fs::rename(&self.tmp, &self.dst).with_context(|| {
            format!("failed to move imported database to {}", self.dst.display())
        })?;
        self.committed = true;
        Ok(ImportSummary {
            bundle_format_detected: self.format.clone(),
        })
    }
}

impl Drop for StagedImport {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.tmp);
        }
    }
}

/// Opens a staged file read-only and checks it is an intact schoold database.
fn check_database(path: &Path) -> anyhow::Result<()> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let verdict: String = conn
        .query_row("PRAGMA quick_check", [], |r| r.get(0))
        .context("not a sqlite database")?;
    if verdict != "ok" {
        bail!("database integrity check failed: {}", verdict);
    }
    let has_users: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'users')",
            [],
            |r| r.get(0),
        )
        .context("failed to read database schema")?;
    if !has_users {
        bail!("not a schoold workspace database");
    }
    Ok(())
}

fn write_staged(tmp: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut out =
        File::create(tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
    out.write_all(bytes)
        .and_then(|_| out.flush())
        .context("failed to write imported database")
}

/// Extracts a bundle (or copies a bare sqlite file) next to the workspace
/// database and validates it. The workspace database is left untouched.
pub fn stage_import(in_path: &Path, workspace_path: &Path) -> anyhow::Result<StagedImport> {
    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("failed to create workspace {}", workspace_path.display()))?;
    let mut staged = StagedImport {
        tmp: workspace_path.join(format!("{}.importing", DB_FILE)),
        dst: workspace_path.join(DB_FILE),
        format: PLAIN_SQLITE_FORMAT.to_string(),
        committed: false,
    };

    if is_zip_file(in_path)? {
        let in_file = File::open(in_path)
            .with_context(|| format!("failed to open bundle {}", in_path.display()))?;
        let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

        let manifest: BundleManifest =
            serde_json::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)?)
                .context("manifest.json is invalid")?;
        if manifest.format != BUNDLE_FORMAT_V1 {
            bail!("unsupported bundle format: {}", manifest.format);
        }

        let db_bytes = read_entry(&mut archive, DB_ENTRY)?;
        let actual_sha = sha256_hex(&db_bytes);
        if !actual_sha.eq_ignore_ascii_case(&manifest.db_sha256) {
            return Err(anyhow!(
                "database digest mismatch: manifest {} but entry hashes to {}",
                manifest.db_sha256,
                actual_sha
            ));
        }
        write_staged(&staged.tmp, &db_bytes)?;
        staged.format = manifest.format;
    } else {
        std::fs::copy(in_path, &staged.tmp).with_context(|| {
            format!(
                "failed to copy sqlite backup from {} to {}",
                in_path.display(),
                staged.tmp.display()
            )
        })?;
    }

    check_database(&staged.tmp)?;
    Ok(staged)
}

/// Restores a bundle (or a bare sqlite file) as the workspace database.
/// The database entry must hash to the manifest digest and open as a
/// schoold database; the previous file is only replaced after that.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    stage_import(in_path, workspace_path)?.commit()
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.display()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    Ok(read == sig.len() && sig == ZIP_MAGIC)
}
