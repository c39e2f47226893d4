//! End-to-end tests for the `overlay-render render` command.
//!
//! These tests invoke the binary directly and check its output and exit code.

#[allow(dead_code)]
mod common;
#[allow(unused_imports)]
use common::prelude::*;

#[test]
fn test_render_help() {
    let mut cmd = cargo_bin_cmd!("overlay-render");
    cmd.arg("render")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Render overlays to a YAML stream"))
        .stdout(predicate::str::contains("--set"))
        .stdout(predicate::str::contains("--load-restrictions"));
}

#[test]
fn test_render_plain_overlay() {
    let fixture = TestFixture::new().with_app(manifests::PLAIN_KUSTOMIZATION);

    fixture
        .command()
        .args(["render", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kind: Deployment"))
        .stdout(predicate::str::contains("name: web"))
        .stdout(predicate::str::contains("---").not());
}

#[test]
fn test_render_multiple_sources_separated() {
    let fixture = TestFixture::new()
        .with_app(manifests::PLAIN_KUSTOMIZATION)
        .with_file("svc/kustomization.yaml", "resources:\n  - service.yaml\n")
        .with_file("svc/service.yaml", manifests::SERVICE);

    let output = fixture
        .command()
        .args(["render", "app", "svc"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let kinds: Vec<_> = stdout
        .lines()
        .filter(|line| line.starts_with("kind: "))
        .collect();
    assert_eq!(kinds, vec!["kind: Deployment", "kind: Service"]);
    assert_eq!(stdout.matches("\n---\n").count(), 1);
}

#[test]
fn test_render_with_set_values() {
    let fixture = TestFixture::new().with_app(manifests::VALUES_KUSTOMIZATION);

    fixture
        .command()
        .args(["render", "app", "--set", "replicas=7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("replicas: '7'"))
        .stdout(predicate::str::contains("name: values").not());

    fixture.child("app/values.yaml").assert(predicate::path::missing());
}

#[test]
fn test_render_source_annotations() {
    let fixture = TestFixture::new().with_app(manifests::PLAIN_KUSTOMIZATION);

    fixture
        .command()
        .args(["render", "app", "--source-annotations"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "manifests.k8s-manifests-lib/source.type: kustomize",
        ))
        .stdout(predicate::str::contains(
            "manifests.k8s-manifests-lib/source.file: deployment.yaml",
        ))
        .stdout(predicate::str::contains("config.kubernetes.io/origin").not());
}

#[test]
fn test_render_warnings_fail_exit_code() {
    let fixture = TestFixture::new().with_app(manifests::DEPRECATED_KUSTOMIZATION);

    fixture
        .command()
        .args(["render", "app", "--warnings", "fail"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("kustomize warnings detected"));
}

#[test]
fn test_render_warnings_logged_by_default() {
    let fixture = TestFixture::new().with_app(manifests::DEPRECATED_KUSTOMIZATION);

    fixture
        .command()
        .args(["render", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("team: platform"))
        .stderr(predicate::str::contains("'commonLabels' is deprecated"));
}

#[test]
fn test_render_file_path_fails() {
    let fixture = TestFixture::new().with_app(manifests::PLAIN_KUSTOMIZATION);

    fixture
        .command()
        .args(["render", "app/deployment.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be a directory"));
}

#[test]
fn test_render_without_sources_fails() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .arg("render")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no overlays to render"));
}

#[test]
fn test_render_invalid_set_flag() {
    let fixture = TestFixture::new().with_app(manifests::PLAIN_KUSTOMIZATION);

    fixture
        .command()
        .args(["render", "app", "--set", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

#[test]
fn test_render_from_config_file_to_output() {
    let fixture = TestFixture::new()
        .with_app(manifests::VALUES_KUSTOMIZATION)
        .with_file(
            "render.yaml",
            "sources:\n  - path: app\n    values:\n      replicas: \"2\"\nsourceAnnotations: true\n",
        );

    fixture
        .command()
        .args(["render", "--config", "render.yaml", "--output", "out.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    fixture
        .child("out.yaml")
        .assert(predicate::str::contains("replicas: '2'"))
        .assert(predicate::str::contains("source.type: kustomize"));
}

#[test]
fn test_render_config_parse_error_has_hint() {
    let fixture = TestFixture::new().with_file("render.yaml", "sources:\n  - values: {}\n");

    fixture
        .command()
        .args(["render", "--config", "render.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn test_render_load_restrictions_rejects_unknown_modes() {
    let fixture = TestFixture::new().with_app(manifests::PLAIN_KUSTOMIZATION);

    for mode in ["", "unspecified"] {
        fixture
            .command()
            .args(["render", "app", "--load-restrictions", mode])
            .assert()
            .failure()
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("--load-restrictions <MODE>"));
    }

    fixture
        .command()
        .args(["render", "app", "--load-restrictions", "none"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kind: Deployment"));
}
