use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::backend::{HttpBackend, SearchBackend};
use crate::config::Config;
use crate::error::{ValidationError, WorkflowError};
use crate::state::{
    Chip, ChipRegion, ExportArtifact, IndexInfo, SearchParameters, SearchResult, SearchStatus,
    SearchTuning,
};
use crate::workflow::{
    present, upload, CachedStatus, ChipRegistry, Event, ExportPackager, IndexLoader, ResultView,
    SearchExecutor, StatusProbe, UploadCoordinator, UploadOutcome, View, WorkflowState,
};

pub struct ControllerSettings {
    pub team_name: String,
    pub export_dir: PathBuf,
    pub tuning: SearchTuning,
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            team_name: config.team_name.clone(),
            export_dir: PathBuf::from(&config.export_dir),
            tuning: config.search,
        }
    }
}

#[derive(Default)]
struct Session {
    workflow: WorkflowState,
    chips: ChipRegistry,
    status: CachedStatus,
    result: Option<SearchResult>,
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the busy flag when the owning operation ends, however it ends.
struct BusyGuard<'a> {
    session: &'a Mutex<Session>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut s = lock(self.session);
        s.workflow = s.workflow.apply(Event::OperationFinished);
    }
}

pub struct WorkflowController {
    backend: Arc<dyn SearchBackend>,
    probe: StatusProbe,
    uploader: UploadCoordinator,
    loader: IndexLoader,
    executor: SearchExecutor,
    packager: ExportPackager,
    team_name: String,
    tuning: SearchTuning,
    session: Mutex<Session>,
}

impl WorkflowController {
    pub fn new(backend: Arc<dyn SearchBackend>, settings: ControllerSettings) -> Self {
        Self {
            probe: StatusProbe::new(backend.clone()),
            uploader: UploadCoordinator::new(backend.clone()),
            loader: IndexLoader::new(backend.clone()),
            executor: SearchExecutor::new(backend.clone()),
            packager: ExportPackager::new(backend.clone(), settings.export_dir),
            backend,
            team_name: settings.team_name,
            tuning: settings.tuning,
            session: Mutex::new(Session::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let backend = Arc::new(HttpBackend::new(&config.api_base));
        Self::new(backend, ControllerSettings::from(config))
    }

    fn begin(&self) -> Result<BusyGuard<'_>, WorkflowError> {
        let mut s = lock(&self.session);
        if s.workflow.busy {
            debug!("rejecting action, another operation is outstanding");
            return Err(WorkflowError::Busy);
        }
        s.workflow = s.workflow.apply(Event::OperationStarted);
        Ok(BusyGuard {
            session: &self.session,
        })
    }

    pub fn endpoint(&self) -> String {
        self.backend.endpoint()
    }

    pub fn state(&self) -> WorkflowState {
        lock(&self.session).workflow
    }

    pub fn status(&self) -> CachedStatus {
        lock(&self.session).status.clone()
    }

    /// Probe failures degrade to the last known status.
    pub async fn refresh_status(&self) -> SearchStatus {
        let cached = self.status();
        let refreshed = self.probe.refresh(cached).await;
        let status = refreshed.status.clone();
        lock(&self.session).status = refreshed;
        status
    }

    pub fn select(&self, view: View) -> Result<WorkflowState, WorkflowError> {
        let mut s = lock(&self.session);
        if !s.workflow.can_select(view) {
            return Err(ValidationError::ResultsUnavailable.into());
        }
        s.workflow = s.workflow.apply(Event::Select(view));
        Ok(s.workflow)
    }

    pub fn chips(&self) -> Vec<Chip> {
        lock(&self.session).chips.chips().to_vec()
    }

    pub fn remove_chip(&self, chip_id: &str) -> bool {
        let removed = lock(&self.session).chips.remove(chip_id);
        if removed.is_some() {
            info!("removed chip {}", chip_id);
        }
        removed.is_some()
    }

    pub async fn upload(&self, files: &[PathBuf]) -> Result<Vec<UploadOutcome>, WorkflowError> {
        if files.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        let _busy = self.begin()?;
        info!("uploading {} chips", files.len());
        let outcomes = self.uploader.upload(files).await;
        let outcomes = upload::reconcile(&mut lock(&self.session).chips, outcomes);
        Ok(outcomes)
    }

    pub async fn extract_chip(&self, region: &ChipRegion) -> Result<Chip, WorkflowError> {
        let _busy = self.begin()?;
        let chip = self.uploader.extract(region).await?;
        if !lock(&self.session).chips.insert(chip.clone()) {
            warn!("backend returned already registered chip {}", chip.chip_id);
            return Err(WorkflowError::BackendRejected(format!(
                "duplicate chip id {}",
                chip.chip_id
            )));
        }
        info!("extracted chip {} from {}", chip.chip_id, region.image_path);
        Ok(chip)
    }

    pub async fn load_index(&self, index_dir: &str) -> Result<IndexInfo, WorkflowError> {
        let _busy = self.begin()?;
        let loaded = self.loader.load(index_dir).await?;
        self.refresh_status().await;
        Ok(loaded)
    }

    /// Search parameters for `class_name` with the configured tuning.
    pub fn parameters(&self, class_name: &str) -> SearchParameters {
        SearchParameters::with_tuning(class_name, self.tuning)
    }

    pub async fn search(&self, params: &SearchParameters) -> Result<SearchResult, WorkflowError> {
        let _busy = self.begin()?;
        let chips = self.chips();
        let result = self.executor.search(&chips, params).await?;

        let mut s = lock(&self.session);
        s.result = Some(result.clone());
        s.workflow = s.workflow.apply(Event::SearchSucceeded);
        Ok(result)
    }

    pub fn result(&self) -> Option<SearchResult> {
        lock(&self.session).result.clone()
    }

    pub fn results_view(&self) -> Result<ResultView, WorkflowError> {
        let s = lock(&self.session);
        let result = s.result.as_ref().ok_or(ValidationError::ResultsUnavailable)?;
        Ok(present(result))
    }

    /// Exports the full current result, not just the displayed rows.
    pub async fn export(&self, team_name: Option<&str>) -> Result<ExportArtifact, WorkflowError> {
        let detections = self
            .result()
            .map(|r| r.detections)
            .ok_or(ValidationError::NoResultsToExport)?;
        let team_name = team_name.unwrap_or(&self.team_name);
        self.packager.export(&detections, team_name).await
    }

    pub async fn preview(&self, chip_id: &str) -> Result<Vec<u8>, WorkflowError> {
        if !lock(&self.session).chips.contains(chip_id) {
            return Err(ValidationError::UnknownChip(chip_id.to_string()).into());
        }
        self.backend.preview(chip_id).await.map_err(|e| {
            warn!("preview for {} failed: {}", chip_id, e);
            WorkflowError::from(e)
        })
    }
}
