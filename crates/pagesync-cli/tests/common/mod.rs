#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(30);

#[allow(dead_code)]
fn config_dir() -> &'static Path {
    static CONFIG_DIR: OnceLock<TempDir> = OnceLock::new();
    CONFIG_DIR
        .get_or_init(|| tempfile::tempdir().expect("failed to create config dir for tests"))
        .path()
}

/// Create a configured `pagesync` command isolated from the user's config
/// and Notion credentials.
#[allow(dead_code)]
pub fn pagesync_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pagesync"));
    cmd.timeout(CMD_TIMEOUT);
    for var in [
        "PAGESYNC_CONFIG",
        "PAGESYNC_MAX_PAGES",
        "NOTION_TOKEN",
        "NOTION_PARENT_PAGE_ID",
        "NOTION_API_BASE",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("PAGESYNC_CONFIG_DIR", config_dir());
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Serve `body` as an HTML page at `route`.
#[allow(dead_code)]
pub async fn serve_html(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!("<html><head><title>{route}</title></head><body>{body}</body></html>"),
            "text/html",
        ))
        .mount(server)
        .await;
}

/// A three-page site under `/site/`: root, a section and a page below it.
#[allow(dead_code)]
pub async fn mount_small_site(server: &MockServer) {
    serve_html(
        server,
        "/site/",
        r#"<main><h1>Home</h1><p>Welcome.</p><a href="guide/">Guide</a></main>"#,
    )
    .await;
    serve_html(
        server,
        "/site/guide/",
        r#"<main><h2>Guide</h2><a href="setup.html">Setup</a></main>"#,
    )
    .await;
    serve_html(
        server,
        "/site/guide/setup.html",
        "<main><h4>Install</h4><pre><code class=\"language-bash\">make</code></pre></main>",
    )
    .await;
}
