//! Shared test utilities for integration and E2E tests.
//!
//! This module provides overlay fixtures on a temporary directory, common
//! manifest snippets and a counting builder.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_app(manifests::PLAIN_KUSTOMIZATION);
//!     // ... test code
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use overlay_render::builder::{BuildOptions, Builder, Diagnostics, Kustomizer, ResourceMap};
use overlay_render::filesystem::Storage;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::manifests;
    #[allow(unused_imports)]
    pub use super::CountingBuilder;
    pub use super::TestFixture;
}

/// Common manifest and descriptor snippets for testing.
#[allow(dead_code)]
pub mod manifests {
    pub const DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 1
  selector:
    matchLabels:
      app: web
  template:
    metadata:
      labels:
        app: web
    spec:
      containers:
        - name: web
          image: nginx
"#;

    pub const SERVICE: &str = r#"apiVersion: v1
kind: Service
metadata:
  name: web
spec:
  selector:
    app: web
"#;

    /// One resource, nothing else.
    pub const PLAIN_KUSTOMIZATION: &str = "resources:\n  - deployment.yaml\n";

    /// Reads `replicas` from the generated values manifest.
    pub const VALUES_KUSTOMIZATION: &str = r#"resources:
  - deployment.yaml
  - values.yaml
replacements:
  - source:
      kind: ConfigMap
      name: values
      fieldPath: data.replicas
    targets:
      - select:
          kind: Deployment
        fieldPaths:
          - spec.replicas
"#;

    /// Uses a deprecated field.
    pub const DEPRECATED_KUSTOMIZATION: &str =
        "resources:\n  - deployment.yaml\ncommonLabels:\n  team: platform\n";

    /// Asks the builder for origin annotations itself.
    pub const ORIGIN_KUSTOMIZATION: &str =
        "resources:\n  - deployment.yaml\nbuildMetadata:\n  - originAnnotations\n";
}

/// Counts builds, then delegates to the reference builder.
#[derive(Default)]
pub struct CountingBuilder {
    builds: AtomicUsize,
}

#[allow(dead_code)]
impl CountingBuilder {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl Builder for CountingBuilder {
    fn build(
        &self,
        fs: &dyn Storage,
        path: &Path,
        options: &BuildOptions,
        diagnostics: &mut Diagnostics,
    ) -> overlay_render::Result<ResourceMap> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Kustomizer::new().build(fs, path, options, diagnostics)
    }
}

/// A temporary directory holding one or more overlays.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::new()
///     .with_app(manifests::PLAIN_KUSTOMIZATION)
///     .with_file("app/extra.yaml", manifests::SERVICE);
///
/// fixture
///     .command()
///     .args(["render", "app"])
///     .assert()
///     .success();
/// ```
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add an `app/` overlay with the given descriptor and the standard deployment.
    pub fn with_app(self, kustomization: &str) -> Self {
        self.with_file("app/kustomization.yaml", kustomization)
            .with_file("app/deployment.yaml", manifests::DEPLOYMENT)
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path of the `app/` overlay.
    #[allow(dead_code)]
    pub fn app_path(&self) -> PathBuf {
        self.temp_dir.path().join("app")
    }

    /// Create a child path in the temp directory.
    #[allow(dead_code)]
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// Create a command configured to run in this fixture's directory.
    #[allow(dead_code)]
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("overlay-render");
        cmd.current_dir(self.path());
        cmd.env_remove("RUST_LOG");
        cmd.env_remove("OVERLAY_RENDER_CONFIG");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.path().exists());
    }

    #[test]
    fn test_fixture_with_app() {
        let fixture = TestFixture::new().with_app(manifests::PLAIN_KUSTOMIZATION);
        assert!(fixture.app_path().join("kustomization.yaml").exists());
        assert!(fixture.app_path().join("deployment.yaml").exists());
    }

    #[test]
    fn test_manifests_are_valid_yaml() {
        for snippet in [
            manifests::DEPLOYMENT,
            manifests::SERVICE,
            manifests::VALUES_KUSTOMIZATION,
            manifests::DEPRECATED_KUSTOMIZATION,
        ] {
            let parsed: Result<serde_yaml::Value, _> = serde_yaml::from_str(snippet);
            assert!(parsed.is_ok(), "invalid snippet: {}", snippet);
        }
    }
}
