//! End-to-end test of the scan pipeline: catalog → dispatch over a fake
//! inspector → post-processing → delivery through the RPC contracts.
//!
//! The inspector is a generated `/bin/sh` script keyed on the requested
//! plugin; the RPC services are in-process mocks recording every call.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cloudsploit_worker::clients::{
    AlertClient, ClearScoreRequest, DataSourceClient, FindingClient, FindingUpsert,
    RecommendUpsert, ResourceUpsert, CLOUDSPLOIT_DATA_SOURCE,
};
use cloudsploit_worker::errors::ScanError;
use cloudsploit_worker::models::datasource::{DataSourceStatus, GcpDataSource};
use cloudsploit_worker::queue::ScanMessage;
use cloudsploit_worker::services::catalog::SettingCatalog;
use cloudsploit_worker::services::dispatcher::{DispatchOptions, ScanDispatcher};
use cloudsploit_worker::services::executor::PluginExecutor;
use cloudsploit_worker::services::fingerprint;
use cloudsploit_worker::services::handler::ScanHandler;

const SETTING_YAML: &str = r#"
default_score: 3.0
plugins:
  IAM/corporateEmailsOnly:
    score: 8.0
    tags: [iam]
    recommend:
      risk: "Personal accounts may bypass corporate controls"
      recommendation: "Restrict project membership to corporate accounts"
  X/Y:
    skip_resources: ["sa-foo@"]
    skip_messages: ["deprecated"]
  Storage/bucketLogging:
    ignore: true
"#;

/// The fake inspector emits a fixed batch per plugin:
/// - corporateEmailsOnly: one FAIL and one OK finding
/// - Y: two findings matching skip patterns and one clean UNKNOWN on "N/A"
/// - bucketLogging: leaves a marker file (must never run)
const INSPECTOR_BODY: &str = r#"
case "$PLUGIN" in
  corporateEmailsOnly)
    cat > "$OUT" <<'EOF'
[
  {"category":"IAM","plugin":"corporateEmailsOnly","description":"Ensures project members use corporate emails","resource":"user:someone@gmail.com","region":"global","status":"FAIL","message":"Non-corporate account found"},
  {"category":"IAM","plugin":"corporateEmailsOnly","description":"Ensures project members use corporate emails","resource":"user:dev@corp.example.com","region":"global","status":"OK","message":"All accounts are corporate"}
]
EOF
    ;;
  Y)
    cat > "$OUT" <<'EOF'
[
  {"category":"X","plugin":"Y","description":"d","resource":"projects/-/sa-foo@example.com","region":"","status":"FAIL","message":"clean"},
  {"category":"X","plugin":"Y","description":"d","resource":"instance-1","region":"","status":"FAIL","message":"this API is deprecated"},
  {"category":"X","plugin":"Y","description":"d","resource":"N/A","region":"","status":"UNKNOWN","message":"query returned no data"}
]
EOF
    ;;
  bucketLogging)
    touch "$DIR/ran_bucketLogging"
    : > "$OUT"
    ;;
esac
"#;

fn fake_inspector(dir: &Path) -> String {
    let path = dir.join("inspector.sh");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(file, "DIR=$(dirname \"$0\")").unwrap();
    writeln!(
        file,
        r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --plugin) PLUGIN="$2"; shift 2 ;;
    --json) OUT="$2"; shift 2 ;;
    *) shift ;;
  esac
done
{INSPECTOR_BODY}"#
    )
    .unwrap();
    let mut perms = file.metadata().unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path.to_string_lossy().into_owned()
}

#[derive(Debug, Default, Clone)]
struct MockRpc {
    data_source: Option<GcpDataSource>,
    statuses: Arc<Mutex<Vec<(DataSourceStatus, String)>>>,
    findings: Arc<Mutex<Vec<FindingUpsert>>>,
    resources: Arc<Mutex<Vec<ResourceUpsert>>>,
    finding_tags: Arc<Mutex<Vec<(u64, String)>>>,
    resource_tags: Arc<Mutex<Vec<(u64, String)>>>,
    recommends: Arc<Mutex<Vec<RecommendUpsert>>>,
    cleared: Arc<Mutex<Vec<ClearScoreRequest>>>,
    analyzed: Arc<Mutex<Vec<u32>>>,
}

impl DataSourceClient for MockRpc {
    async fn get_gcp_data_source(
        &self,
        _gcp_id: u32,
        _project_id: u32,
        _google_data_source_id: u32,
    ) -> Result<Option<GcpDataSource>, ScanError> {
        Ok(self.data_source.clone())
    }

    async fn attach_gcp_data_source(&self, data_source: &GcpDataSource) -> Result<(), ScanError> {
        self.statuses
            .lock()
            .unwrap()
            .push((data_source.status, data_source.status_detail.clone()));
        Ok(())
    }
}

impl FindingClient for MockRpc {
    async fn put_finding(&self, finding: &FindingUpsert) -> Result<u64, ScanError> {
        let mut findings = self.findings.lock().unwrap();
        findings.push(finding.clone());
        Ok(findings.len() as u64)
    }

    async fn put_resource(&self, resource: &ResourceUpsert) -> Result<u64, ScanError> {
        let mut resources = self.resources.lock().unwrap();
        resources.push(resource.clone());
        Ok(resources.len() as u64)
    }

    async fn tag_finding(
        &self,
        _project_id: u32,
        finding_id: u64,
        tag: &str,
    ) -> Result<(), ScanError> {
        self.finding_tags
            .lock()
            .unwrap()
            .push((finding_id, tag.to_string()));
        Ok(())
    }

    async fn tag_resource(
        &self,
        _project_id: u32,
        resource_id: u64,
        tag: &str,
    ) -> Result<(), ScanError> {
        self.resource_tags
            .lock()
            .unwrap()
            .push((resource_id, tag.to_string()));
        Ok(())
    }

    async fn put_recommend(&self, recommend: &RecommendUpsert) -> Result<(), ScanError> {
        self.recommends.lock().unwrap().push(recommend.clone());
        Ok(())
    }

    async fn clear_score(&self, request: &ClearScoreRequest) -> Result<(), ScanError> {
        self.cleared.lock().unwrap().push(request.clone());
        Ok(())
    }
}

impl AlertClient for MockRpc {
    async fn analyze_alert(&self, project_id: u32) -> Result<(), ScanError> {
        self.analyzed.lock().unwrap().push(project_id);
        Ok(())
    }
}

fn handler(dir: &Path, mock: MockRpc) -> ScanHandler<MockRpc, MockRpc, MockRpc> {
    let catalog = Arc::new(SettingCatalog::from_yaml(SETTING_YAML).unwrap());
    let executor = PluginExecutor::new(fake_inspector(dir), dir, 0)
        .with_credentials("sa@example.iam.gserviceaccount.com", "key-data");
    let dispatcher = ScanDispatcher::new(
        executor,
        catalog,
        DispatchOptions {
            parallelism: 2,
            scan_timeout: Duration::from_secs(30),
            scan_timeout_all: Duration::from_secs(60),
            work_dir: dir.to_path_buf(),
        },
    );
    ScanHandler::new(dispatcher, mock.clone(), mock.clone(), mock)
}

fn mock_with_data_source() -> MockRpc {
    MockRpc {
        data_source: Some(GcpDataSource {
            gcp_id: 1,
            project_id: 1001,
            google_data_source_id: 4,
            gcp_project_id: "my-project".to_string(),
            status: DataSourceStatus::Unknown,
            status_detail: String::new(),
            scan_at: None,
        }),
        ..MockRpc::default()
    }
}

fn message() -> ScanMessage {
    ScanMessage {
        gcp_id: 1,
        project_id: 1001,
        google_data_source_id: 4,
        scan_only: false,
    }
}

#[tokio::test]
async fn full_scan_delivers_findings_resources_and_status() {
    let dir = tempfile::tempdir().unwrap();
    let mock = mock_with_data_source();
    let handler = handler(dir.path(), mock.clone());

    handler
        .handle_scan(&message(), "msg-1", &CancellationToken::new())
        .await
        .unwrap();

    // Two finding upserts survive: the FAIL (score 8.0 via override) and the
    // UNKNOWN (score 1.0). Skip patterns drop the other two Y findings.
    let findings = mock.findings.lock().unwrap();
    assert_eq!(findings.len(), 2);

    let fail = findings
        .iter()
        .find(|f| f.original_score == 8.0)
        .expect("FAIL finding");
    assert_eq!(fail.data_source, CLOUDSPLOIT_DATA_SOURCE);
    assert_eq!(fail.original_max_score, 10.0);
    assert_eq!(fail.resource_name, "user:someone@gmail.com");
    assert_eq!(
        fail.data_source_id,
        fingerprint::data_source_id(
            "IAM",
            "corporateEmailsOnly",
            "Ensures project members use corporate emails",
            "global",
            "user:someone@gmail.com",
        )
    );

    // The UNKNOWN finding had resource "N/A": presentation is rewritten but
    // identity is computed on the original value.
    let unknown = findings
        .iter()
        .find(|f| f.original_score == 1.0)
        .expect("UNKNOWN finding");
    assert_eq!(unknown.resource_name, "Unknown");
    assert_eq!(
        unknown.data_source_id,
        fingerprint::data_source_id("X", "Y", "d", "", "N/A")
    );

    // The OK finding becomes an asset registration, not a finding.
    let resources = mock.resources.lock().unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].resource_name, "user:dev@corp.example.com");
}

#[tokio::test]
async fn full_scan_attaches_tags_and_recommendation() {
    let dir = tempfile::tempdir().unwrap();
    let mock = mock_with_data_source();
    let handler = handler(dir.path(), mock.clone());

    handler
        .handle_scan(&message(), "msg-1", &CancellationToken::new())
        .await
        .unwrap();

    let findings = mock.findings.lock().unwrap();
    let fail_id = findings
        .iter()
        .position(|f| f.original_score == 8.0)
        .unwrap() as u64
        + 1;
    let finding_tags = mock.finding_tags.lock().unwrap();
    let fail_tags: Vec<&str> = finding_tags
        .iter()
        .filter(|(id, _)| *id == fail_id)
        .map(|(_, tag)| tag.as_str())
        .collect();
    for expected in [
        "google",
        "gcp",
        "cloudsploit",
        "my-project",
        "iam",
        "corporateEmailsOnly",
    ] {
        assert!(fail_tags.contains(&expected), "missing tag {expected}");
    }

    let resource_tags = mock.resource_tags.lock().unwrap();
    let asset_tags: Vec<&str> = resource_tags.iter().map(|(_, tag)| tag.as_str()).collect();
    assert_eq!(asset_tags, ["google", "gcp", "my-project", "iam"]);

    let recommends = mock.recommends.lock().unwrap();
    assert_eq!(recommends.len(), 1);
    assert_eq!(recommends[0].recommend_type, "IAM/corporateEmailsOnly");
    assert!(recommends[0].risk.contains("Personal accounts"));
}

#[tokio::test]
async fn full_scan_closes_out_status_and_clears_stale_scores() {
    let dir = tempfile::tempdir().unwrap();
    let mock = mock_with_data_source();
    let handler = handler(dir.path(), mock.clone());

    let before = chrono::Utc::now();
    handler
        .handle_scan(&message(), "msg-1", &CancellationToken::new())
        .await
        .unwrap();

    let cleared = mock.cleared.lock().unwrap();
    assert_eq!(cleared.len(), 1);
    assert_eq!(cleared[0].data_source, CLOUDSPLOIT_DATA_SOURCE);
    assert_eq!(cleared[0].project_id, 1001);
    assert_eq!(cleared[0].tag, vec!["my-project".to_string()]);
    assert!(cleared[0].before_at >= before);

    // The scan is OK even though an UNKNOWN finding exists; the summary
    // travels as status detail.
    let statuses = mock.statuses.lock().unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].0, DataSourceStatus::Ok);
    assert!(statuses[0].1.contains("X: query returned no data"));

    assert_eq!(*mock.analyzed.lock().unwrap(), vec![1001]);

    // The ignored plugin never ran.
    assert!(!dir.path().join("ran_bucketLogging").exists());
}

#[tokio::test]
async fn rerunning_the_scan_is_idempotent_downstream() {
    let dir = tempfile::tempdir().unwrap();
    let mock = mock_with_data_source();
    let handler = handler(dir.path(), mock.clone());

    for correlation in ["msg-1", "msg-2"] {
        handler
            .handle_scan(&message(), correlation, &CancellationToken::new())
            .await
            .unwrap();
    }

    let findings = mock.findings.lock().unwrap();
    assert_eq!(findings.len(), 4);
    let mut first: Vec<&str> = findings[..2].iter().map(|f| f.data_source_id.as_str()).collect();
    let mut second: Vec<&str> = findings[2..].iter().map(|f| f.data_source_id.as_str()).collect();
    first.sort_unstable();
    second.sort_unstable();
    assert_eq!(first, second);
}
