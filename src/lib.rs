//! fanjvm: Fantom fcode → JVM class file backend
//!
//! 读取已编译的 pod 归档，为其中每个类型发出一个或多个 class 文件。
//!
//! # Example
//!
//! ```no_run
//! use fanjvm::{emit_pod_file, Result};
//! use fanjvm::util::config::EmitConfig;
//! use std::path::Path;
//!
//! fn main() -> Result<()> {
//!     let written = emit_pod_file(
//!         Path::new("acme.pod"),
//!         Path::new("out"),
//!         &EmitConfig::default(),
//!     )?;
//!     println!("{} classes", written.len());
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/fanjvm")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod emit;
pub mod fcode;
pub mod jvm;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use emit::{EmitError, EmitResult, EmittedClass, Namespace, PodEmitter};

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::fcode::FPod;
use crate::util::config::EmitConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "fanjvm";

/// 发出单个 pod；类型体必须已经读取
pub fn emit_pod(
    pod: &FPod,
    config: &EmitConfig,
) -> EmitResult<Vec<EmittedClass>> {
    let ns = Namespace::single(pod);
    PodEmitter::new(pod, &ns, config).emit()
}

/// 读取 pod 归档，把 class 写到 `out` 下，返回写出的文件
pub fn emit_pod_file(
    path: &Path,
    out: &Path,
    config: &EmitConfig,
) -> Result<Vec<PathBuf>> {
    emit_pod_file_in(path, out, &Namespace::new(), config)
}

/// 同 [`emit_pod_file`]；`deps` 中的 pod 参与跨 pod 的基类链与 mixin 解析
pub fn emit_pod_file_in(
    path: &Path,
    out: &Path,
    deps: &Namespace<'_>,
    config: &EmitConfig,
) -> Result<Vec<PathBuf>> {
    config.validate()?;

    let pod = open_pod(path)?;
    let mut ns = Namespace::new();
    for dep in deps.pods() {
        ns.add(dep);
    }
    ns.add(&pod);
    debug!("emitting {} against {} pods", pod.name, ns.len());

    let classes = PodEmitter::new(&pod, &ns, config)
        .emit()
        .with_context(|| format!("Failed to emit pod {}", pod.name))?;

    let mut written = Vec::with_capacity(classes.len());
    for class in &classes {
        let file = out.join(class.relative_path());
        if let Some(dir) = file.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        fs::write(&file, &class.bytes)
            .with_context(|| format!("Failed to write class: {}", file.display()))?;
        debug!("wrote {} ({} bytes)", file.display(), class.bytes.len());
        written.push(file);
    }
    Ok(written)
}

/// 打开 pod 归档并读取全部类型体
pub fn open_pod(path: &Path) -> Result<FPod> {
    let mut pod = FPod::open(path)
        .with_context(|| format!("Failed to open pod: {}", path.display()))?;
    pod.read_all_bodies()
        .with_context(|| format!("Failed to read types of {}", path.display()))?;
    Ok(pod)
}
