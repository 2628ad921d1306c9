use crate::config::AppConfig;
use crate::ws::ui::UiBroadcaster;
use std::sync::Arc;
use udisk_backup::inventory::{DiskInventory, LsblkInventory};
use udisk_backup::{EligibilityResolver, RunRecorder, TransferPlanner, TransferSupervisor};

pub struct AppState {
    pub config: AppConfig,
    pub ui: UiBroadcaster,
    pub inventory: Arc<dyn DiskInventory>,
    pub resolver: Arc<EligibilityResolver>,
    pub planner: TransferPlanner,
    pub recorder: Arc<RunRecorder>,
    pub supervisor: TransferSupervisor,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self::with_inventory(config, Arc::new(LsblkInventory::new()))
    }

    pub fn with_inventory(config: AppConfig, inventory: Arc<dyn DiskInventory>) -> Self {
        let settings = config.core.backup.clone();
        let ui = UiBroadcaster::new();
        let resolver = Arc::new(EligibilityResolver::new(
            inventory.clone(),
            settings.marker_label.clone(),
        ));
        let recorder = Arc::new(RunRecorder::new(resolver.clone()));
        let supervisor =
            TransferSupervisor::new(settings.clone(), recorder.clone(), Arc::new(ui.clone()));

        Self {
            config,
            ui,
            inventory,
            resolver,
            planner: TransferPlanner::new(settings),
            recorder,
            supervisor,
        }
    }
}
