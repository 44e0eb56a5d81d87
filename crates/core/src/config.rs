//! Simulation configuration
//!
//! [`SimulationConfig`] holds every user-facing setting of a run. It is loaded from
//! JSON (missing keys fall back to defaults), validated once, and owned by the
//! orchestrator. Values that kernels need every dispatch are precomputed into
//! [`DerivedConstants`]. Live edits go through [`apply_config_patch`], which reports
//! whether the change can be applied in place or needs a full reinitialisation.

use crate::error::{CelerisError, CelerisResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Governing equations solved by the update pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquationMode {
    /// Nonlinear shallow water, no dispersion
    #[default]
    Nlsw,
    /// Madsen-Sørensen Boussinesq with still-water-depth coefficients
    Boussinesq,
    /// Fully nonlinear dispersive mode with depth-dependent coefficients
    Coulwave,
}

impl EquationMode {
    /// Whether the tridiagonal dispersion correction runs
    #[must_use]
    pub fn is_dispersive(self) -> bool {
        !matches!(self, Self::Nlsw)
    }
}

/// Time integration scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeScheme {
    /// Forward Euler
    Euler,
    /// Third-order Adams-Bashforth
    AdamsBashforth3,
    /// Adams-Bashforth predictor with fourth-order Adams-Moulton corrector
    #[default]
    PredictorCorrector,
}

impl TimeScheme {
    /// Value written into the update pass uniform block
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Euler => 0,
            Self::AdamsBashforth3 => 1,
            Self::PredictorCorrector => 2,
        }
    }
}

/// Treatment of one domain edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryType {
    /// Reflective solid wall
    #[default]
    Wall,
    /// Absorbing sponge layer
    Sponge,
    /// Incident wave maker
    IncidentWave,
    /// Periodic with the opposite edge
    Periodic,
}

impl BoundaryType {
    /// Value written into the boundary pass uniform block
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::Wall => 0,
            Self::Sponge => 1,
            Self::IncidentWave => 2,
            Self::Periodic => 3,
        }
    }
}

/// Boundary kind per edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Boundaries {
    /// x = 0 edge
    pub west: BoundaryType,
    /// x = W-1 edge
    pub east: BoundaryType,
    /// y = 0 edge
    pub south: BoundaryType,
    /// y = H-1 edge
    pub north: BoundaryType,
}

/// One linear wave component forced at incident-wave boundaries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveComponent {
    /// Amplitude in meters
    pub amplitude: f32,
    /// Period in seconds
    pub period: f32,
    /// Propagation direction in radians (0 = towards +x)
    pub direction: f32,
    /// Phase offset in radians
    #[serde(default)]
    pub phase: f32,
}

/// Wave-breaking eddy-viscosity model settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakingConfig {
    /// Enables the breaking pass and dissipative fluxes
    pub enabled: bool,
    /// Breaking onset, as a fraction of sqrt(g h)
    pub onset_threshold: f32,
    /// Threshold reached after the transition time
    pub final_threshold: f32,
    /// Transition time in units of sqrt(h / g)
    pub transition_factor: f32,
    /// Mixing length coefficient
    pub mixing_length: f32,
    /// Decay rate of the foam channel (1/s)
    pub white_water_decay_rate: f32,
}

impl Default for BreakingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            onset_threshold: 0.65,
            final_threshold: 0.15,
            transition_factor: 5.0,
            mixing_length: 1.2,
            white_water_decay_rate: 0.1,
        }
    }
}

/// Suspended sediment transport settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SedimentConfig {
    /// Enables the sediment passes
    pub enabled: bool,
    /// Median grain diameter in meters
    pub d50: f32,
    /// Grain specific gravity
    pub specific_gravity: f32,
    /// Bed porosity
    pub porosity: f32,
    /// Critical Shields parameter
    pub critical_shields: f32,
    /// Pick-up coefficient (m/s)
    pub erosion_coefficient: f32,
    /// Settling velocity (m/s)
    pub settling_velocity: f32,
}

impl Default for SedimentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            d50: 0.0002,
            specific_gravity: 2.65,
            porosity: 0.4,
            critical_shields: 0.045,
            erosion_coefficient: 1.0e-4,
            settling_velocity: 0.0125,
        }
    }
}

/// Tuning of the adaptive `render_step` controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Measurement window length in seconds
    pub window_secs: f64,
    /// Per-step time ratio below which `render_step` grows
    pub speedup_ratio: f64,
    /// Per-step time ratio above which `render_step` shrinks
    pub slowdown_ratio: f64,
    /// Unchanged windows after which `render_step` is probed upwards
    pub stable_windows: u32,
    /// Upper bound for `render_step`
    pub max_render_step: u32,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            window_secs: 1.0,
            speedup_ratio: 0.9,
            slowdown_ratio: 1.001,
            stable_windows: 10,
            max_render_step: 1000,
        }
    }
}

/// Gaussian sea-floor uplift played back over a time window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisturbanceSource {
    /// Centre x in meters
    pub center_x: f32,
    /// Centre y in meters
    pub center_y: f32,
    /// Gaussian radius in meters
    pub radius: f32,
    /// Final uplift in meters (negative for subsidence)
    pub amplitude: f32,
    /// Simulation time the motion starts
    #[serde(default)]
    pub start_time: f32,
    /// Rise time in seconds
    pub duration: f32,
}

impl DisturbanceSource {
    /// Playing between `start_time` and `start_time + duration`
    #[must_use]
    pub fn is_active(&self, time: f32) -> bool {
        time >= self.start_time && time < self.start_time + self.duration
    }

    /// Fraction of the uplift applied by `time`, smoothstep shaped
    #[must_use]
    pub fn progress(&self, time: f32) -> f32 {
        if self.duration <= 0.0 {
            return if time >= self.start_time { 1.0 } else { 0.0 };
        }
        let t = ((time - self.start_time) / self.duration).clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    }
}

/// A time-series gauge at a grid cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeLocation {
    /// Label used in exported series
    #[serde(default)]
    pub name: String,
    /// Cell x index
    pub x: u32,
    /// Cell y index
    pub y: u32,
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Domain width in cells
    pub width: u32,
    /// Domain height in cells
    pub height: u32,
    /// Cell size in x (m)
    pub dx: f32,
    /// Cell size in y (m)
    pub dy: f32,
    /// Courant number used to derive `dt`
    pub courant: f32,
    /// Overrides the Courant-derived time step
    pub fixed_dt: Option<f32>,
    /// Time integration scheme
    pub time_scheme: TimeScheme,
    /// Governing equations
    pub equation: EquationMode,
    /// Boussinesq dispersion coefficient
    pub bcoef: f32,
    /// Gravitational acceleration
    pub g: f32,
    /// Still water level
    pub sea_level: f32,
    /// Representative depth for `dt` and the wet/dry epsilon
    pub base_depth: f32,
    /// Minmod limiter parameter (1 = minmod, 2 = MC)
    pub theta: f32,
    /// Friction coefficient (Manning n or quadratic f)
    pub friction: f32,
    /// Interpret `friction` as Manning's n
    pub is_manning: bool,
    /// Edge treatments
    pub boundaries: Boundaries,
    /// Sponge layer width in cells
    pub boundary_width: u32,
    /// Incident wave spectrum
    pub waves: Vec<WaveComponent>,
    /// Breaking model
    pub breaking: BreakingConfig,
    /// Sediment model
    pub sediment: SedimentConfig,
    /// Simulation steps per frame at startup
    pub render_step: u32,
    /// Adaptive cadence tuning
    pub cadence: CadenceConfig,
    /// Prescribed bottom motions
    pub disturbances: Vec<DisturbanceSource>,
    /// Time-series gauges
    pub gauges: Vec<GaugeLocation>,
    /// Upper bound on a host readback wait
    pub readback_timeout_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            dx: 1.0,
            dy: 1.0,
            courant: 0.15,
            fixed_dt: None,
            time_scheme: TimeScheme::default(),
            equation: EquationMode::default(),
            bcoef: 1.0 / 15.0,
            g: 9.80665,
            sea_level: 0.0,
            base_depth: 1.0,
            theta: 1.3,
            friction: 0.001,
            is_manning: true,
            boundaries: Boundaries::default(),
            boundary_width: 25,
            waves: Vec::new(),
            breaking: BreakingConfig::default(),
            sediment: SedimentConfig::default(),
            render_step: 20,
            cadence: CadenceConfig::default(),
            disturbances: Vec::new(),
            gauges: Vec::new(),
            readback_timeout_ms: 2000,
        }
    }
}

/// Smallest domain extent that leaves an interior inside the 3-cell margins
pub const MIN_DOMAIN_CELLS: u32 = 8;

fn positive(field: &'static str, value: f32) -> CelerisResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CelerisError::config(
            field,
            format!("must be finite and positive, got {value}"),
        ))
    }
}

impl SimulationConfig {
    /// Load and validate a JSON configuration file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or fails validation
    pub fn load<P: AsRef<Path>>(path: P) -> CelerisResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| CelerisError::io(path, e))?;
        Self::from_json(&contents)
    }

    /// Parse and validate a JSON configuration string
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or fails validation
    pub fn from_json(json: &str) -> CelerisResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize as pretty-printed JSON
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_json(&self) -> CelerisResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every setting for range and consistency
    ///
    /// # Errors
    /// Returns [`CelerisError::Config`] naming the first offending setting
    pub fn validate(&self) -> CelerisResult<()> {
        if self.width < MIN_DOMAIN_CELLS {
            return Err(CelerisError::config(
                "width",
                format!("must be at least {MIN_DOMAIN_CELLS} cells, got {}", self.width),
            ));
        }
        if self.height < MIN_DOMAIN_CELLS {
            return Err(CelerisError::config(
                "height",
                format!("must be at least {MIN_DOMAIN_CELLS} cells, got {}", self.height),
            ));
        }
        positive("dx", self.dx)?;
        positive("dy", self.dy)?;
        positive("courant", self.courant)?;
        positive("g", self.g)?;
        positive("base_depth", self.base_depth)?;
        if let Some(dt) = self.fixed_dt {
            positive("fixed_dt", dt)?;
        }
        if !(1.0..=2.0).contains(&self.theta) {
            return Err(CelerisError::config(
                "theta",
                format!("must lie in [1, 2], got {}", self.theta),
            ));
        }
        if !self.friction.is_finite() || self.friction < 0.0 {
            return Err(CelerisError::config(
                "friction",
                format!("must be finite and non-negative, got {}", self.friction),
            ));
        }
        if !self.bcoef.is_finite() {
            return Err(CelerisError::config("bcoef", "must be finite"));
        }

        let b = self.boundaries;
        if (b.west == BoundaryType::Periodic) != (b.east == BoundaryType::Periodic) {
            return Err(CelerisError::config(
                "boundaries",
                "west and east must both be periodic or neither",
            ));
        }
        if (b.south == BoundaryType::Periodic) != (b.north == BoundaryType::Periodic) {
            return Err(CelerisError::config(
                "boundaries",
                "south and north must both be periodic or neither",
            ));
        }
        let has_sponge = [b.west, b.east, b.south, b.north].contains(&BoundaryType::Sponge);
        if has_sponge && 2 * self.boundary_width >= self.width.min(self.height) {
            return Err(CelerisError::config(
                "boundary_width",
                format!(
                    "{} cells does not fit a {}x{} domain",
                    self.boundary_width, self.width, self.height
                ),
            ));
        }
        for wave in &self.waves {
            positive("waves.period", wave.period)?;
        }
        for source in &self.disturbances {
            positive("disturbances.radius", source.radius)?;
            if !source.duration.is_finite() || source.duration < 0.0 {
                return Err(CelerisError::config(
                    "disturbances.duration",
                    "must be finite and non-negative",
                ));
            }
        }
        for gauge in &self.gauges {
            if gauge.x >= self.width || gauge.y >= self.height {
                return Err(CelerisError::config(
                    "gauges",
                    format!("gauge '{}' at ({}, {}) is outside the domain", gauge.name, gauge.x, gauge.y),
                ));
            }
        }
        if self.sediment.enabled {
            positive("sediment.d50", self.sediment.d50)?;
            positive("sediment.settling_velocity", self.sediment.settling_velocity)?;
            if self.sediment.specific_gravity <= 1.0 {
                return Err(CelerisError::config(
                    "sediment.specific_gravity",
                    "must exceed 1",
                ));
            }
            if !(0.0..1.0).contains(&self.sediment.porosity) {
                return Err(CelerisError::config("sediment.porosity", "must lie in [0, 1)"));
            }
        }
        if self.render_step == 0 {
            return Err(CelerisError::config("render_step", "must be at least 1"));
        }
        let c = self.cadence;
        if !(c.window_secs > 0.0 && c.speedup_ratio <= 1.0 && c.slowdown_ratio >= 1.0) {
            return Err(CelerisError::config(
                "cadence",
                "window must be positive with speedup_ratio <= 1 <= slowdown_ratio",
            ));
        }
        if c.max_render_step == 0 {
            return Err(CelerisError::config("cadence.max_render_step", "must be at least 1"));
        }
        Ok(())
    }

    /// Time step in seconds
    #[must_use]
    pub fn dt(&self) -> f32 {
        self.fixed_dt
            .unwrap_or_else(|| self.courant * self.dx / (self.g * self.base_depth).sqrt())
    }

    /// Precompute the per-dispatch constants
    #[must_use]
    pub fn derived(&self) -> DerivedConstants {
        DerivedConstants::new(self)
    }
}

/// `ceil(log2(n))` for n >= 1
#[must_use]
pub fn ceil_log2(n: u32) -> u32 {
    if n <= 1 {
        0
    } else {
        u32::BITS - (n - 1).leading_zeros()
    }
}

/// Values derived once from a [`SimulationConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedConstants {
    pub dt: f32,
    pub one_over_dx: f32,
    pub one_over_dy: f32,
    pub one_over_d2x: f32,
    pub one_over_d3x: f32,
    pub one_over_d2y: f32,
    pub one_over_d3y: f32,
    pub one_over_dxdy: f32,
    pub g_over_dx: f32,
    pub g_over_dy: f32,
    pub half_g: f32,
    pub two_theta: f32,
    /// Desingularisation epsilon, `(base_depth / 1000)^2`
    pub epsilon: f32,
    pub bcoef_g: f32,
    pub reflect_x: u32,
    pub reflect_y: u32,
    /// PCR iterations along x
    pub px: u32,
    /// PCR iterations along y
    pub py: u32,
    pub dispatch_x: u32,
    pub dispatch_y: u32,
}

impl DerivedConstants {
    fn new(config: &SimulationConfig) -> Self {
        let (dx, dy) = (config.dx, config.dy);
        Self {
            dt: config.dt(),
            one_over_dx: 1.0 / dx,
            one_over_dy: 1.0 / dy,
            one_over_d2x: 1.0 / (dx * dx),
            one_over_d3x: 1.0 / (dx * dx * dx),
            one_over_d2y: 1.0 / (dy * dy),
            one_over_d3y: 1.0 / (dy * dy * dy),
            one_over_dxdy: 1.0 / (dx * dy),
            g_over_dx: config.g / dx,
            g_over_dy: config.g / dy,
            half_g: 0.5 * config.g,
            two_theta: 2.0 * config.theta,
            epsilon: (config.base_depth / 1000.0).powi(2),
            bcoef_g: config.bcoef * config.g,
            reflect_x: 2 * (config.width - 3),
            reflect_y: 2 * (config.height - 3),
            px: ceil_log2(config.width),
            py: ceil_log2(config.height),
            dispatch_x: config.width.div_ceil(crate::TILE_SIZE),
            dispatch_y: config.height.div_ceil(crate::TILE_SIZE),
        }
    }
}

/// A partial configuration applied to a running simulation
///
/// Every `Some` field replaces the corresponding setting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub dx: Option<f32>,
    pub dy: Option<f32>,
    pub courant: Option<f32>,
    pub time_scheme: Option<TimeScheme>,
    pub equation: Option<EquationMode>,
    pub bcoef: Option<f32>,
    pub g: Option<f32>,
    pub sea_level: Option<f32>,
    pub base_depth: Option<f32>,
    pub theta: Option<f32>,
    pub friction: Option<f32>,
    pub is_manning: Option<bool>,
    pub boundaries: Option<Boundaries>,
    pub boundary_width: Option<u32>,
    pub waves: Option<Vec<WaveComponent>>,
    pub breaking: Option<BreakingConfig>,
    pub sediment: Option<SedimentConfig>,
    pub render_step: Option<u32>,
    pub cadence: Option<CadenceConfig>,
    pub disturbances: Option<Vec<DisturbanceSource>>,
    pub gauges: Option<Vec<GaugeLocation>>,
}

/// What the caller must do after a patch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Field layout changed; all fields must be reallocated
    pub requires_reinit: bool,
    /// Tridiagonal coefficients depend on a changed value
    pub refresh_coefficients: bool,
    /// Names of the settings that actually changed
    pub changed: Vec<&'static str>,
}

/// Apply `patch` to `config`
///
/// The patch is applied to a copy and validated first, so on error `config` is left
/// untouched.
///
/// # Errors
/// Returns [`CelerisError::Config`] if the patched configuration is invalid
pub fn apply_config_patch(
    config: &mut SimulationConfig,
    patch: &ConfigPatch,
) -> CelerisResult<PatchOutcome> {
    let mut next = config.clone();
    let mut outcome = PatchOutcome::default();

    macro_rules! patch_field {
        ($field:ident, reinit = $reinit:expr, coefficients = $coef:expr) => {
            if let Some(value) = &patch.$field {
                if next.$field != *value {
                    next.$field = value.clone();
                    outcome.changed.push(stringify!($field));
                    outcome.requires_reinit |= $reinit;
                    outcome.refresh_coefficients |= $coef;
                }
            }
        };
    }

    patch_field!(width, reinit = true, coefficients = false);
    patch_field!(height, reinit = true, coefficients = false);
    patch_field!(dx, reinit = false, coefficients = true);
    patch_field!(dy, reinit = false, coefficients = true);
    patch_field!(courant, reinit = false, coefficients = false);
    patch_field!(time_scheme, reinit = false, coefficients = false);
    patch_field!(equation, reinit = true, coefficients = false);
    patch_field!(bcoef, reinit = false, coefficients = true);
    patch_field!(g, reinit = false, coefficients = false);
    patch_field!(sea_level, reinit = false, coefficients = false);
    patch_field!(base_depth, reinit = false, coefficients = false);
    patch_field!(theta, reinit = false, coefficients = false);
    patch_field!(friction, reinit = false, coefficients = false);
    patch_field!(is_manning, reinit = false, coefficients = false);
    patch_field!(boundaries, reinit = false, coefficients = false);
    patch_field!(boundary_width, reinit = false, coefficients = false);
    patch_field!(waves, reinit = true, coefficients = false);
    patch_field!(render_step, reinit = false, coefficients = false);
    patch_field!(cadence, reinit = false, coefficients = false);
    patch_field!(disturbances, reinit = false, coefficients = false);
    patch_field!(gauges, reinit = true, coefficients = false);

    if let Some(breaking) = patch.breaking {
        if next.breaking != breaking {
            outcome.requires_reinit |= next.breaking.enabled != breaking.enabled;
            next.breaking = breaking;
            outcome.changed.push("breaking");
        }
    }
    if let Some(sediment) = patch.sediment {
        if next.sediment != sediment {
            outcome.requires_reinit |= next.sediment.enabled != sediment.enabled;
            next.sediment = sediment;
            outcome.changed.push("sediment");
        }
    }

    next.validate()?;
    *config = next;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_derived_constants() {
        let config = SimulationConfig::default();
        let derived = config.derived();

        assert_relative_eq!(derived.dt, 0.15 / 9.80665_f32.sqrt(), epsilon = 1e-7);
        assert_relative_eq!(derived.epsilon, 1.0e-6, epsilon = 1e-12);
        assert_relative_eq!(derived.two_theta, 2.6);
        assert_eq!(derived.reflect_x, 2 * (800 - 3));
        assert_eq!(derived.px, 10);
        assert_eq!(derived.py, 10);
        assert_eq!(derived.dispatch_x, 50);
        assert_eq!(derived.dispatch_y, 38);
    }

    #[test]
    fn test_ceil_log2() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(8), 3);
        assert_eq!(ceil_log2(9), 4);
        assert_eq!(ceil_log2(64), 6);
        assert_eq!(ceil_log2(65), 7);
    }

    #[test]
    fn test_fixed_dt_overrides_courant() {
        let config = SimulationConfig {
            fixed_dt: Some(0.01),
            ..SimulationConfig::default()
        };
        assert_eq!(config.dt(), 0.01);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimulationConfig::from_json(
            r#"{ "width": 64, "height": 32, "equation": "boussinesq",
                 "boundaries": { "west": "periodic", "east": "periodic" } }"#,
        )
        .unwrap();
        assert_eq!(config.width, 64);
        assert_eq!(config.equation, EquationMode::Boussinesq);
        assert_eq!(config.boundaries.west, BoundaryType::Periodic);
        assert_eq!(config.boundaries.north, BoundaryType::Wall);
        assert_relative_eq!(config.courant, 0.15);
    }

    #[test]
    fn test_rejects_small_domain() {
        let config = SimulationConfig {
            width: 4,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CelerisError::Config { field: "width", .. })
        ));
    }

    #[test]
    fn test_rejects_one_sided_periodic() {
        let mut config = SimulationConfig::default();
        config.boundaries.west = BoundaryType::Periodic;
        assert!(config.validate().is_err());
        config.boundaries.east = BoundaryType::Periodic;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_finite_spacing() {
        let config = SimulationConfig {
            dx: f32::NAN,
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_patch_live_values() {
        let mut config = SimulationConfig::default();
        let patch = ConfigPatch {
            friction: Some(0.02),
            render_step: Some(5),
            ..ConfigPatch::default()
        };
        let outcome = apply_config_patch(&mut config, &patch).unwrap();
        assert!(!outcome.requires_reinit);
        assert!(!outcome.refresh_coefficients);
        assert_eq!(outcome.changed, vec!["friction", "render_step"]);
        assert_eq!(config.friction, 0.02);
        assert_eq!(config.render_step, 5);
    }

    #[test]
    fn test_patch_layout_change_needs_reinit() {
        let mut config = SimulationConfig::default();
        let patch = ConfigPatch {
            equation: Some(EquationMode::Coulwave),
            bcoef: Some(0.05),
            ..ConfigPatch::default()
        };
        let outcome = apply_config_patch(&mut config, &patch).unwrap();
        assert!(outcome.requires_reinit);
        assert!(outcome.refresh_coefficients);

        let mut sediment = config.sediment;
        sediment.enabled = true;
        let outcome = apply_config_patch(
            &mut config,
            &ConfigPatch {
                sediment: Some(sediment),
                ..ConfigPatch::default()
            },
        )
        .unwrap();
        assert!(outcome.requires_reinit);
    }

    #[test]
    fn test_patch_unchanged_value_is_noop() {
        let mut config = SimulationConfig::default();
        let patch = ConfigPatch {
            friction: Some(config.friction),
            ..ConfigPatch::default()
        };
        let outcome = apply_config_patch(&mut config, &patch).unwrap();
        assert!(outcome.changed.is_empty());
    }

    #[test]
    fn test_invalid_patch_leaves_config_untouched() {
        let mut config = SimulationConfig::default();
        let patch = ConfigPatch {
            width: Some(2),
            friction: Some(0.5),
            ..ConfigPatch::default()
        };
        assert!(apply_config_patch(&mut config, &patch).is_err());
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn test_disturbance_progress() {
        let source = DisturbanceSource {
            center_x: 0.0,
            center_y: 0.0,
            radius: 1.0,
            amplitude: 1.0,
            start_time: 1.0,
            duration: 2.0,
        };
        assert!(!source.is_active(0.5));
        assert!(source.is_active(1.0));
        assert!(!source.is_active(3.0));
        assert_eq!(source.progress(0.0), 0.0);
        assert_relative_eq!(source.progress(2.0), 0.5);
        assert_eq!(source.progress(5.0), 1.0);
    }
}
