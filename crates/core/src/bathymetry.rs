//! Bathymetry and initial conditions
//!
//! Elevations are relative to the vertical datum: negative values are below the
//! datum (sea bed), positive values are land. The bottom field packs the face
//! elevations the flux and update passes need together with a near-shore flag.

use crate::config::SimulationConfig;
use crate::error::{CelerisError, CelerisResult};
use crate::field::FieldData;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bottom flag of cells far from land
pub const WET_FLAG: f32 = 99.0;

/// Bottom flag of cells within [`LAND_SEARCH_RADIUS`] cells of land
pub const NEAR_LAND_FLAG: f32 = -99.0;

/// Search radius of the near-land flag in cells
pub const LAND_SEARCH_RADIUS: isize = 3;

/// Bed elevation per cell
#[derive(Debug, Clone, PartialEq)]
pub struct Bathymetry {
    width: u32,
    height: u32,
    elevation: Vec<f32>,
}

impl Bathymetry {
    /// Flat bed `depth` meters below the datum
    #[must_use]
    pub fn flat(width: u32, height: u32, depth: f32) -> Self {
        Self {
            width,
            height,
            elevation: vec![-depth; width as usize * height as usize],
        }
    }

    /// Bed elevation from a function of the cell index
    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: Fn(u32, u32) -> f32,
    {
        let elevation = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            elevation,
        }
    }

    /// Row-major elevations
    ///
    /// # Errors
    /// Returns [`CelerisError::Config`] if the length does not match the extent
    pub fn from_elevations(width: u32, height: u32, elevation: Vec<f32>) -> CelerisResult<Self> {
        if elevation.len() != width as usize * height as usize {
            return Err(CelerisError::config(
                "bathymetry",
                format!(
                    "{} elevations for a {}x{} grid",
                    elevation.len(),
                    width,
                    height
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            elevation,
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Elevation at a cell, clamped into the grid
    #[must_use]
    pub fn elevation(&self, x: isize, y: isize) -> f32 {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.elevation[cy * self.width as usize + cx]
    }

    /// Nearest-neighbour resample onto a `width` × `height` grid
    #[must_use]
    pub fn resampled(&self, width: u32, height: u32) -> Self {
        if (width, height) == (self.width, self.height) {
            return self.clone();
        }
        Self::from_fn(width, height, |x, y| {
            let sx = (u64::from(x) * u64::from(self.width) / u64::from(width.max(1))) as isize;
            let sy = (u64::from(y) * u64::from(self.height) / u64::from(height.max(1))) as isize;
            self.elevation(sx, sy)
        })
    }

    /// Pack into the bottom field layout (BN, BE, B, flag)
    ///
    /// BN and BE average the cell with its north and east neighbours. The flag is
    /// negative when any cell within three cells has an elevation at or above
    /// the datum.
    #[must_use]
    pub fn to_bottom_field(&self) -> FieldData {
        let mut field = FieldData::new(self.width as usize, self.height as usize);
        for y in 0..self.height as isize {
            for x in 0..self.width as isize {
                let b = self.elevation(x, y);
                let north = 0.5 * (b + self.elevation(x, y + 1));
                let east = 0.5 * (b + self.elevation(x + 1, y));

                let r = LAND_SEARCH_RADIUS;
                let near_land = (-r..=r)
                    .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
                    .any(|(dx, dy)| self.elevation(x + dx, y + dy) >= 0.0);
                let flag = if near_land { NEAR_LAND_FLAG } else { WET_FLAG };

                field.set(x as usize, y as usize, [north, east, b, flag]);
            }
        }
        field
    }
}

/// Declarative bathymetry description used by scenario files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BathymetrySpec {
    /// Flat bed at `depth` below the datum
    Flat { depth: f32 },
    /// Plane beach rising along +x from `offshore_depth` at x = 0 to
    /// `shore_elevation` at the east edge
    Slope {
        offshore_depth: f32,
        shore_elevation: f32,
    },
    /// Row-major elevations of the full grid
    Grid { elevation: Vec<f32> },
}

impl BathymetrySpec {
    /// Build the bathymetry for a `width` × `height` domain
    ///
    /// # Errors
    /// Returns [`CelerisError::Config`] if a grid spec has the wrong length
    pub fn build(&self, width: u32, height: u32) -> CelerisResult<Bathymetry> {
        match self {
            Self::Flat { depth } => Ok(Bathymetry::flat(width, height, *depth)),
            Self::Slope {
                offshore_depth,
                shore_elevation,
            } => {
                let span = (width.max(2) - 1) as f32;
                Ok(Bathymetry::from_fn(width, height, |x, _| {
                    let t = x as f32 / span;
                    -offshore_depth + t * (shore_elevation + offshore_depth)
                }))
            }
            Self::Grid { elevation } => Bathymetry::from_elevations(width, height, elevation.clone()),
        }
    }
}

impl Default for BathymetrySpec {
    fn default() -> Self {
        Self::Flat { depth: 1.0 }
    }
}

/// Free-surface state at t = 0
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitialCondition {
    /// Still water at sea level
    #[default]
    Still,
    /// Gaussian hump of the free surface at rest
    GaussianBump {
        /// Centre x in meters
        center_x: f32,
        /// Centre y in meters
        center_y: f32,
        /// Gaussian radius in meters
        radius: f32,
        /// Peak elevation above sea level in meters
        amplitude: f32,
    },
}

impl InitialCondition {
    /// Initial state field (eta, P, Q, C)
    ///
    /// Cells whose bed is above the resulting surface start dry with eta = B.
    #[must_use]
    pub fn to_state(&self, bathymetry: &Bathymetry, config: &SimulationConfig) -> FieldData {
        let mut state = FieldData::new(bathymetry.width as usize, bathymetry.height as usize);
        for y in 0..bathymetry.height as usize {
            for x in 0..bathymetry.width as usize {
                let b = bathymetry.elevation(x as isize, y as isize);
                let surface = config.sea_level + self.surface_offset(x, y, config);
                let eta = if surface > b { surface } else { b };
                state.set(x, y, [eta, 0.0, 0.0, 0.0]);
            }
        }
        state
    }

    fn surface_offset(&self, x: usize, y: usize, config: &SimulationConfig) -> f32 {
        match *self {
            Self::Still => 0.0,
            Self::GaussianBump {
                center_x,
                center_y,
                radius,
                amplitude,
            } => {
                if radius <= 0.0 {
                    return 0.0;
                }
                let px = x as f32 * config.dx - center_x;
                let py = y as f32 * config.dy - center_y;
                amplitude * (-(px * px + py * py) / (2.0 * radius * radius)).exp()
            }
        }
    }
}

/// A complete run description: configuration, bed and initial state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub config: SimulationConfig,
    pub bathymetry: BathymetrySpec,
    pub initial_condition: InitialCondition,
}

impl Scenario {
    /// Load a scenario from a JSON file
    ///
    /// # Errors
    /// Returns [`CelerisError::Io`] or [`CelerisError::Parse`]
    pub fn load<P: AsRef<Path>>(path: P) -> CelerisResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CelerisError::io(path, e))?;
        Self::from_json(&text)
    }

    /// Parse a scenario; missing keys fall back to defaults
    ///
    /// # Errors
    /// Returns [`CelerisError::Parse`] for malformed JSON and
    /// [`CelerisError::Config`] for an invalid configuration
    pub fn from_json(json: &str) -> CelerisResult<Self> {
        let scenario: Self = serde_json::from_str(json)?;
        scenario.config.validate()?;
        Ok(scenario)
    }

    /// Bathymetry sized to the configured domain
    ///
    /// # Errors
    /// Returns [`CelerisError::Config`] for a grid spec of the wrong length
    pub fn build_bathymetry(&self) -> CelerisResult<Bathymetry> {
        self.bathymetry.build(self.config.width, self.config.height)
    }
}
