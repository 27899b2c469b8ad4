use super::*;
use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct ScriptedVcs {
    calls: RefCell<Vec<String>>,
    diff_output: String,
    failures_before_success: RefCell<u32>,
}

impl ScriptedVcs {
    fn with_diff(output: &str) -> Self {
        Self {
            diff_output: output.to_string(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl VersionControl for ScriptedVcs {
    fn diff_names(&self, from: &str, to: &str) -> Result<ChangeSet> {
        self.calls.borrow_mut().push(format!("diff {from} {to}"));
        let mut remaining = self.failures_before_success.borrow_mut();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ScopeError::DiffResolution("index.lock exists".to_string()));
        }
        Ok(ChangeSet::from_lines(&self.diff_output))
    }

    fn fetch(&self, remote: &str, branch: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("fetch {remote} {branch}"));
        Ok(())
    }

    fn checkout(&self, reference: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("checkout {reference}"));
        Ok(())
    }
}

struct CannedPulls(Vec<&'static str>);

impl PullRequestSource for CannedPulls {
    fn changed_files(&self, number: &str) -> Result<ChangeSet> {
        assert_eq!(number, "42");
        Ok(self.0.iter().copied().collect())
    }
}

fn context(branch: &str) -> BranchContext {
    BranchContext {
        branch: branch.to_string(),
        ..BranchContext::default()
    }
}

fn no_wait() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::ZERO,
    }
}

#[test]
fn change_set_deduplicates_and_skips_blank_lines() {
    let changes = ChangeSet::from_lines("a.py\n\nb.py\na.py\n  \n");
    assert_eq!(changes.len(), 2);
    assert!(changes.contains("a.py"));
    assert!(changes.contains("b.py"));
}

#[test]
fn manifests_keep_only_service_level_paths() {
    let changes: ChangeSet = [
        "services/orders/requirements.txt",
        "services/orders/handler/requirements.txt",
        "services/orders/handler.py",
        "requirements.txt",
    ]
    .into_iter()
    .collect();
    let narrowed = changes.manifests("requirements.txt", 3);
    assert_eq!(
        narrowed.iter().collect::<Vec<_>>(),
        ["services/orders/requirements.txt"]
    );
}

#[test]
fn ephemeral_branch_diffs_against_baseline_and_returns() {
    let vcs = ScriptedVcs::with_diff("services/a/handler.py\n");
    let registry = EnvironmentRegistry::standard();
    let resolver = DiffResolver::new(&vcs, None, &registry, "develop", "_dev");

    let changes = resolver.resolve(&context("alice_dev")).expect("resolve");

    assert!(changes.contains("services/a/handler.py"));
    assert_eq!(
        vcs.calls(),
        [
            "fetch origin develop",
            "checkout develop",
            "checkout alice_dev",
            "diff develop alice_dev"
        ]
    );
}

#[test]
fn ephemeral_suffix_wins_over_pull_request() {
    let vcs = ScriptedVcs::default();
    let registry = EnvironmentRegistry::standard();
    let resolver = DiffResolver::new(&vcs, None, &registry, "develop", "_dev");
    let ctx = BranchContext {
        branch: "bob_dev".to_string(),
        pull_request: Some("https://github.com/acme/api/pull/42".to_string()),
        sha: None,
    };
    assert!(matches!(
        resolver.strategy(&ctx).expect("strategy"),
        DiffStrategy::Ephemeral { .. }
    ));
}

#[test]
fn pull_request_uses_hosting_listing() {
    let vcs = ScriptedVcs::default();
    let pulls = CannedPulls(vec!["services/a/x.py", "services/a/x.py", "README.md"]);
    let registry = EnvironmentRegistry::standard();
    let resolver = DiffResolver::new(&vcs, Some(&pulls), &registry, "develop", "_dev");
    let ctx = BranchContext {
        branch: "feature/x".to_string(),
        pull_request: Some("https://github.com/acme/api/pull/42".to_string()),
        sha: Some("abc123".to_string()),
    };

    let changes = resolver.resolve(&ctx).expect("resolve");

    assert_eq!(changes.len(), 2);
    assert!(vcs.calls().is_empty());
}

#[test]
fn pull_request_without_hosting_client_is_a_network_error() {
    let vcs = ScriptedVcs::default();
    let registry = EnvironmentRegistry::standard();
    let resolver = DiffResolver::new(&vcs, None, &registry, "develop", "_dev");
    let ctx = BranchContext {
        branch: "feature/x".to_string(),
        pull_request: Some("https://github.com/acme/api/pull/42".to_string()),
        sha: None,
    };
    assert!(matches!(
        resolver.resolve(&ctx),
        Err(ScopeError::Network(_))
    ));
}

#[test]
fn trunk_branch_diffs_head_against_parent() {
    let vcs = ScriptedVcs::with_diff("a\nb\n");
    let registry = EnvironmentRegistry::standard();
    let resolver = DiffResolver::new(&vcs, None, &registry, "develop", "_dev");

    resolver.resolve(&context("staging")).expect("resolve");

    assert_eq!(vcs.calls(), ["diff HEAD HEAD~1"]);
}

#[test]
fn other_branches_diff_triggering_commit() {
    let vcs = ScriptedVcs::with_diff("a\n");
    let registry = EnvironmentRegistry::standard();
    let resolver = DiffResolver::new(&vcs, None, &registry, "develop", "_dev");
    let ctx = BranchContext {
        branch: "feature/x".to_string(),
        sha: Some("abc123".to_string()),
        pull_request: None,
    };

    resolver.resolve(&ctx).expect("resolve");

    assert_eq!(vcs.calls(), ["diff abc123^ abc123"]);
}

#[test]
fn fallback_without_sha_fails() {
    let vcs = ScriptedVcs::default();
    let registry = EnvironmentRegistry::standard();
    let resolver = DiffResolver::new(&vcs, None, &registry, "develop", "_dev");
    let err = resolver.resolve(&context("feature/x")).unwrap_err();
    assert!(matches!(err, ScopeError::DiffResolution(_)));
}

#[test]
fn transient_diff_failures_are_retried() {
    let vcs = ScriptedVcs::with_diff("a\n");
    *vcs.failures_before_success.borrow_mut() = 2;
    let registry = EnvironmentRegistry::standard();
    let resolver =
        DiffResolver::new(&vcs, None, &registry, "develop", "_dev").with_retry(no_wait());

    let changes = resolver.resolve(&context("develop")).expect("resolve");

    assert!(changes.contains("a"));
    assert_eq!(vcs.calls().len(), 3);
}

#[test]
fn retries_are_bounded() {
    let vcs = ScriptedVcs::with_diff("a\n");
    *vcs.failures_before_success.borrow_mut() = 5;
    let registry = EnvironmentRegistry::standard();
    let resolver =
        DiffResolver::new(&vcs, None, &registry, "develop", "_dev").with_retry(no_wait());

    assert!(resolver.resolve(&context("develop")).is_err());
    assert_eq!(vcs.calls().len(), 3);
}

#[test]
fn pull_request_number_is_last_segment() {
    assert_eq!(
        pull_request_number("https://github.com/acme/api/pull/17").expect("number"),
        "17"
    );
    assert_eq!(pull_request_number("17/").expect("number"), "17");
    assert!(pull_request_number("https://github.com/acme/api/pull/").is_err());
}

/// Answer one connection with a canned response; returns the request head.
fn answer(listener: &TcpListener, status_line: &str, body: &str) -> String {
    let (mut stream, _) = listener.accept().expect("accept");
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut buf).expect("read request");
        if read == 0 {
            break;
        }
        request.extend_from_slice(&buf[..read]);
    }
    let response = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).expect("write response");
    String::from_utf8_lossy(&request).to_string()
}

fn serve_once(
    status_line: &'static str,
    body: &'static str,
) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || answer(&listener, status_line, body));
    (format!("http://{addr}"), handle)
}

/// Serve `bodies` as successive 200 responses, one connection each.
fn serve_pages(bodies: Vec<String>) -> (String, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        bodies
            .iter()
            .map(|body| answer(&listener, "HTTP/1.1 200 OK", body))
            .collect()
    });
    (format!("http://{addr}"), handle)
}

fn files_body(names: impl IntoIterator<Item = String>) -> String {
    let records: Vec<serde_json::Value> = names
        .into_iter()
        .map(|name| serde_json::json!({ "filename": name, "status": "modified" }))
        .collect();
    serde_json::Value::Array(records).to_string()
}

fn direct_agent() -> ureq::Agent {
    ureq::Agent::config_builder().proxy(None).build().into()
}

#[test]
fn github_client_reads_filenames_with_bearer_token() {
    let (base, server) = serve_once(
        "HTTP/1.1 200 OK",
        r#"[{"filename":"services/a/handler.py","status":"modified"},{"filename":"README.md"}]"#,
    );
    let client = GithubClient::with_agent(
        direct_agent(),
        &base,
        "acme",
        "api",
        Some("s3cret".to_string()),
    );

    let changes = client.changed_files("42").expect("list files");

    assert_eq!(changes.len(), 2);
    assert!(changes.contains("services/a/handler.py"));
    let request = server.join().expect("server thread");
    assert!(request.starts_with("GET /repos/acme/api/pulls/42/files?per_page=100&page=1 "));
    assert!(request
        .to_ascii_lowercase()
        .contains("authorization: bearer s3cret"));
}

#[test]
fn github_client_surfaces_error_status_as_network_error() {
    let (base, server) = serve_once("HTTP/1.1 404 Not Found", "");
    let client = GithubClient::with_agent(direct_agent(), &base, "acme", "api", None);

    let err = client.changed_files("42").unwrap_err();

    assert!(matches!(err, ScopeError::Network(_)), "{err}");
    server.join().expect("server thread");
}

#[test]
fn github_client_rejects_malformed_body() {
    let (base, server) = serve_once("HTTP/1.1 200 OK", r#"{"message":"Bad credentials"}"#);
    let client = GithubClient::with_agent(direct_agent(), &base, "acme", "api", None);

    assert!(matches!(
        client.changed_files("42"),
        Err(ScopeError::Network(_))
    ));
    server.join().expect("server thread");
}

#[test]
fn github_client_follows_pages_until_a_short_page() {
    let first = files_body((0..100).map(|index| format!("services/s{index}/handler.py")));
    let second = files_body(["commons/db.py".to_string(), "services/s0/handler.py".to_string()]);
    let (base, server) = serve_pages(vec![first, second]);
    let client = GithubClient::with_agent(direct_agent(), &base, "acme", "api", None);

    let changes = client.changed_files("7").expect("list files");

    assert_eq!(changes.len(), 101);
    assert!(changes.contains("commons/db.py"));
    assert!(changes.contains("services/s99/handler.py"));
    let requests = server.join().expect("server thread");
    assert_eq!(requests.len(), 2);
    assert!(requests[0].starts_with("GET /repos/acme/api/pulls/7/files?per_page=100&page=1 "));
    assert!(requests[1].starts_with("GET /repos/acme/api/pulls/7/files?per_page=100&page=2 "));
}
