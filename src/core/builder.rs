use std::sync::Arc;

use super::{config::Config, supervisor::Supervisor};
use crate::events::Bus;
use crate::process::{CommandLauncher, Launcher};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Assembles a [`Supervisor`] from a [`Config`], subscribers and a launcher.
///
/// ```no_run
/// # async fn demo() -> std::io::Result<()> {
/// use poolvisor::{CommandLauncher, Config, Supervisor};
///
/// let sup = Supervisor::builder(Config::default())
///     .with_launcher(CommandLauncher::new("my-worker").arg("--serve"))
///     .build();
/// # let _ = sup;
/// # Ok(())
/// # }
/// ```
pub struct SupervisorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    launcher: Option<Arc<dyn Launcher>>,
}

impl SupervisorBuilder {
    /// Starts with no subscribers and the default launcher.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            launcher: None,
        }
    }

    /// Replaces the subscriber list.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets how server and worker processes are created.
    ///
    /// Defaults to `sleep infinity` through [`CommandLauncher`].
    pub fn with_launcher<L: Launcher>(mut self, launcher: L) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    /// Spawns the subscriber tasks and the bus listener, so it must run
    /// inside a tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(CommandLauncher::new("sleep").arg("infinity")));

        Arc::new(Supervisor::new_internal(self.cfg, bus, launcher, subs))
    }
}
