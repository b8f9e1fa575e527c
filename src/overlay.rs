use std::path::Path;

use serde::Serialize;

/// Search path variable read by Gazebo Harmonic when resolving `model://` URIs.
pub const GZ_SIM_RESOURCE_PATH: &str = "GZ_SIM_RESOURCE_PATH";
/// Legacy Gazebo Classic model path, kept for compatibility.
pub const GAZEBO_MODEL_PATH: &str = "GAZEBO_MODEL_PATH";

/// Environment variable values that let the simulator find the farm models.
///
/// Computing an overlay does not touch the process environment; call
/// [`EnvOverlay::apply`] to install it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvOverlay {
    pub gz_sim_resource_path: String,
    pub gazebo_model_path: String,
}

impl EnvOverlay {
    /// Prepends `model_path` to an existing `GZ_SIM_RESOURCE_PATH` value, or uses it
    /// alone when unset. `GAZEBO_MODEL_PATH` is always replaced outright.
    pub fn compute(model_path: &Path, existing_resource_path: Option<&str>) -> Self {
        let model = model_path.display().to_string();
        let gz_sim_resource_path = match existing_resource_path {
            Some(existing) => format!("{model}:{existing}"),
            None => model.clone(),
        };
        Self {
            gz_sim_resource_path,
            gazebo_model_path: model,
        }
    }

    /// Returns the variables in the order they are applied.
    pub fn vars(&self) -> [(&'static str, &str); 2] {
        [
            (GZ_SIM_RESOURCE_PATH, self.gz_sim_resource_path.as_str()),
            (GAZEBO_MODEL_PATH, self.gazebo_model_path.as_str()),
        ]
    }

    /// Writes the overlay into the process environment. Children spawned
    /// afterwards inherit it; nothing restores the previous values.
    ///
    /// # Safety
    /// No other thread may read or write the environment concurrently; call
    /// it before starting the async runtime.
    pub unsafe fn apply(&self) {
        for (key, value) in self.vars() {
            tracing::debug!(key, value, "setting environment variable");
            // SAFETY: the caller guarantees no concurrent environment access.
            unsafe { std::env::set_var(key, value) };
        }
    }
}
