//! Shared test utilities.
//!
//! Provides an in-memory state store, canned relation credentials and
//! recording fakes for every external collaborator.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use crate::{
    config::Settings,
    core::{
        database::{Backend, DatabaseCredentials},
        kv::{KeyValueStore, UnitStateStore},
        ports::{Port, PortSet},
        proxy::ProxyRoute,
        resolver::{ResolvedConfiguration, resolve},
        version::{InstallTarget, PackageVersion},
    },
    errors::{Error, Result},
    host::{
        BackupHelper, Collaborators, Command, CommandOutput, CommandRunner, HostInfo,
        PackageInfo, PackageManager, PortControl, ProxyRelation, StatusReporter, WorkloadStatus,
    },
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` store with all tables initialized.
pub async fn setup_test_store() -> Result<UnitStateStore> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(UnitStateStore::new(db))
}

/// Settings writing every managed file below `dir`, with no index retry delay.
pub fn test_settings(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.paths.gitlab_config = dir.join("gitlab.rb");
    settings.paths.commands_file = dir.join("commands.load");
    settings.paths.lock_file = dir.join("agent.lock");
    settings.upgrade.index_retry_delay_ms = 0;
    settings
}

/// Distinct credentials per backend
pub fn test_credentials(backend: Backend) -> DatabaseCredentials {
    let (host, port, database, password) = match backend {
        Backend::Postgres => ("10.0.0.2", "5432", "gitlab_pg", "secret"),
        Backend::MySql => ("10.0.0.3", "3306", "gitlab_my", "mysecret"),
        Backend::LegacyMySql => ("10.0.0.4", "3306", "gitlab_legacy", "legacysecret"),
    };
    DatabaseCredentials {
        host: host.to_string(),
        port: port.to_string(),
        database: database.to_string(),
        user: "gitlab".to_string(),
        password: password.to_string(),
    }
}

/// Writes all five credential keys of `backend`.
pub async fn seed_backend(
    store: &dyn KeyValueStore,
    backend: Backend,
    credentials: &DatabaseCredentials,
) -> Result<()> {
    let values = [
        &credentials.host,
        &credentials.port,
        &credentials.database,
        &credentials.user,
        &credentials.password,
    ];
    for (key, value) in backend.credential_keys().into_iter().zip(values) {
        store.set(key, value).await?;
    }
    Ok(())
}

/// Resolves `settings` against an empty store and the fake host.
pub async fn resolved_for(settings: &Settings, fakes: &Fakes) -> Result<ResolvedConfiguration> {
    let store = setup_test_store().await?;
    resolve(settings, &store, fakes.host.as_ref()).await
}

/// Records every command; answers with canned stdout per program.
#[derive(Default)]
pub struct RecordingCommandRunner {
    calls: Mutex<Vec<Vec<String>>>,
    responses: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingCommandRunner {
    pub fn respond(&self, program: &str, stdout: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(program.to_string(), stdout.to_string());
    }

    /// Makes every run of `program` exit with status 1.
    pub fn fail(&self, program: &str) {
        self.failing.lock().unwrap().insert(program.to_string());
    }

    pub fn succeed(&self, program: &str) {
        self.failing.lock().unwrap().remove(program);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingCommandRunner {
    async fn run(&self, command: &Command) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.argv());
        if self.failing.lock().unwrap().contains(command.program()) {
            return Err(Error::ExternalTool {
                command: command.to_string(),
                status: Some(1),
                output: "simulated failure".to_string(),
            });
        }
        let stdout = self
            .responses
            .lock()
            .unwrap()
            .get(command.program())
            .cloned()
            .unwrap_or_default();
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

pub struct FakeHost {
    pub fqdn: String,
    pub ingress: String,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            fqdn: "mock.example.com".to_string(),
            ingress: "10.0.0.5".to_string(),
        }
    }
}

#[async_trait]
impl HostInfo for FakeHost {
    async fn fqdn(&self) -> Result<String> {
        Ok(self.fqdn.clone())
    }

    async fn ingress_address(&self, _relation: &str) -> Result<String> {
        Ok(self.ingress.clone())
    }
}

/// In-memory port table
#[derive(Default)]
pub struct FakePorts {
    open: Mutex<PortSet>,
    actions: Mutex<Vec<String>>,
}

impl FakePorts {
    pub fn with_open<const N: usize>(ports: [&str; N]) -> Self {
        Self {
            open: Mutex::new(ports.iter().map(|p| p.parse().unwrap()).collect()),
            actions: Mutex::default(),
        }
    }

    pub fn open_set(&self) -> PortSet {
        self.open.lock().unwrap().clone()
    }

    /// `open 80/tcp`, `close 22/tcp`, ... in call order
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }
}

#[async_trait]
impl PortControl for FakePorts {
    async fn opened_ports(&self) -> Result<Vec<Port>> {
        Ok(self.open_set().into_iter().collect())
    }

    async fn open_port(&self, port: &Port) -> Result<()> {
        self.open.lock().unwrap().insert(*port);
        self.actions.lock().unwrap().push(format!("open {port}"));
        Ok(())
    }

    async fn close_port(&self, port: &Port) -> Result<()> {
        self.open.lock().unwrap().remove(port);
        self.actions.lock().unwrap().push(format!("close {port}"));
        Ok(())
    }
}

#[derive(Default)]
struct PackageState {
    available: Vec<PackageVersion>,
    installed: Option<PackageVersion>,
    installs: Vec<(String, InstallTarget)>,
    fetch_failures: u32,
    fetch_count: u32,
    ignore_installs: bool,
    fail_installs: bool,
}

/// Package index with a fixed set of available versions.
///
/// Installing `<major>.*` lands on the newest available release of that major.
#[derive(Default)]
pub struct FakePackages {
    state: Mutex<PackageState>,
}

impl FakePackages {
    pub fn new<const N: usize>(available: [&str; N], installed: Option<&str>) -> Self {
        Self {
            state: Mutex::new(PackageState {
                available: available
                    .iter()
                    .map(|v| PackageVersion::parse(v).unwrap())
                    .collect(),
                installed: installed.map(|v| PackageVersion::parse(v).unwrap()),
                ..PackageState::default()
            }),
        }
    }

    /// The next `n` fetches fail.
    pub fn fail_fetches(&self, n: u32) {
        self.state.lock().unwrap().fetch_failures = n;
    }

    /// Installs are recorded but leave the installed version unchanged.
    pub fn ignore_installs(&self) {
        self.state.lock().unwrap().ignore_installs = true;
    }

    pub fn fail_installs(&self) {
        self.state.lock().unwrap().fail_installs = true;
    }

    pub fn installs(&self) -> Vec<(String, InstallTarget)> {
        self.state.lock().unwrap().installs.clone()
    }

    pub fn installed(&self) -> Option<PackageVersion> {
        self.state.lock().unwrap().installed.clone()
    }

    pub fn fetch_count(&self) -> u32 {
        self.state.lock().unwrap().fetch_count
    }
}

#[async_trait]
impl PackageManager for FakePackages {
    async fn refresh(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn fetch(&self, name: &str) -> Result<Option<PackageInfo>> {
        let mut state = self.state.lock().unwrap();
        state.fetch_count += 1;
        if state.fetch_failures > 0 {
            state.fetch_failures -= 1;
            return Err(Error::PackageIndex {
                package: name.to_string(),
                message: "simulated index failure".to_string(),
            });
        }
        Ok(Some(PackageInfo {
            candidate: state.available.iter().max().cloned(),
            installed: state.installed.clone(),
        }))
    }

    async fn install(&self, name: &str, target: &InstallTarget) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.installs.push((name.to_string(), target.clone()));
        if state.fail_installs {
            return Err(Error::ExternalTool {
                command: format!("apt-get install {}", target.package_spec(name)),
                status: Some(100),
                output: "simulated install failure".to_string(),
            });
        }
        if state.ignore_installs || (name != "gitlab-ce" && name != "gitlab-ee") {
            return Ok(());
        }
        let landed = match target {
            InstallTarget::Latest => state.available.iter().max().cloned(),
            InstallTarget::Exact(version) => Some(version.clone()),
            InstallTarget::Major(major) => state
                .available
                .iter()
                .filter(|v| v.major() == *major)
                .max()
                .cloned(),
        };
        if landed.is_some() {
            state.installed = landed;
        }
        Ok(())
    }
}

/// Keeps every status set, in order
#[derive(Default)]
pub struct FakeStatus {
    history: Mutex<Vec<(WorkloadStatus, String)>>,
}

impl FakeStatus {
    pub fn history(&self) -> Vec<(WorkloadStatus, String)> {
        self.history.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<(WorkloadStatus, String)> {
        self.history.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl StatusReporter for FakeStatus {
    async fn set(&self, status: WorkloadStatus, message: &str) {
        self.history
            .lock()
            .unwrap()
            .push((status, message.to_string()));
    }
}

#[derive(Default)]
pub struct FakeProxy {
    published: Mutex<Vec<Vec<ProxyRoute>>>,
}

impl FakeProxy {
    pub fn last_routes(&self) -> Vec<ProxyRoute> {
        self.published
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProxyRelation for FakeProxy {
    async fn configure(&self, routes: &[ProxyRoute]) -> Result<()> {
        self.published.lock().unwrap().push(routes.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeBackup {
    runs: Mutex<usize>,
}

impl FakeBackup {
    pub fn runs(&self) -> usize {
        *self.runs.lock().unwrap()
    }
}

#[async_trait]
impl BackupHelper for FakeBackup {
    async fn backup(&self) -> Result<()> {
        *self.runs.lock().unwrap() += 1;
        Ok(())
    }
}

/// One fake per collaborator, kept around for assertions
#[derive(Default)]
pub struct Fakes {
    pub commands: Arc<RecordingCommandRunner>,
    pub packages: Arc<FakePackages>,
    pub ports: Arc<FakePorts>,
    pub status: Arc<FakeStatus>,
    pub host: Arc<FakeHost>,
    pub proxy: Arc<FakeProxy>,
    pub backup: Arc<FakeBackup>,
}

impl Fakes {
    pub fn with_packages(packages: FakePackages) -> Self {
        Self {
            packages: Arc::new(packages),
            ..Self::default()
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            commands: self.commands.clone(),
            packages: self.packages.clone(),
            ports: self.ports.clone(),
            status: self.status.clone(),
            host: self.host.clone(),
            proxy: self.proxy.clone(),
            backup: self.backup.clone(),
        }
    }
}
