pub mod display;
pub mod placeholder;
pub mod simulator;

use std::sync::Arc;

use crate::config::PanelDriverConfig;
use display::{EpaperPanel, PanelProbe};
use simulator::SimulatorPanel;

/// Detection routine for the configured panel driver.
pub fn probe_for(driver: &PanelDriverConfig) -> PanelProbe {
    match driver {
        PanelDriverConfig::Simulator(options) => {
            let options = options.clone();
            Arc::new(move || -> anyhow::Result<Box<dyn EpaperPanel>> {
                Ok(Box::new(SimulatorPanel::new(&options)) as Box<dyn EpaperPanel>)
            })
        }
    }
}
