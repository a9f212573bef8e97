//! Build workspace preparation
//!
//! The build container runs as a mapped host user, so everything it reads or
//! writes on the host must already be owned by that uid/gid.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use nix::unistd::{chown, Gid, Uid};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{BuildError, Result};

/// Name of the Satis configuration inside the build root
pub const CONFIG_FILE: &str = "satis.json";

/// Output directory inside the build root
pub const OUTPUT_DIR: &str = "out";

/// Create `build_root` and `build_root/out`, parent first, and hand both to
/// `uid:gid`. Running it again on an existing tree is fine.
pub fn prepare_directories(build_root: &Path, uid: u32, gid: u32) -> Result<PathBuf> {
    let output = build_root.join(OUTPUT_DIR);

    for dir in [build_root, output.as_path()] {
        fs::create_dir_all(dir).map_err(|e| BuildError::workspace(dir, e))?;
        chown(dir, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
            .map_err(|e| BuildError::workspace(dir, e))?;
        debug!("Prepared directory {}", dir.display());
    }

    Ok(output)
}

/// Write `document` as JSON to `build_root/satis.json`, replacing any
/// previous file, and hand it to `uid:gid`
pub fn write_build_config(
    build_root: &Path,
    document: &Map<String, Value>,
    uid: u32,
    gid: u32,
) -> Result<PathBuf> {
    let path = build_root.join(CONFIG_FILE);

    let file = File::create(&path).map_err(|e| BuildError::write_config(&path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, document)
        .map_err(|e| BuildError::write_config(&path, e))?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| BuildError::write_config(&path, e))?;

    chown(path.as_path(), Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
        .map_err(|e| BuildError::write_config(&path, e))?;

    debug!("Wrote build configuration {}", path.display());
    Ok(path)
}
