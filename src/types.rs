use approx::relative_eq;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Backscatter raster in dB (NaN where no valid sample exists)
pub type BackscatterImage = Array2<f32>;

/// Per-pixel water indicator
pub type WaterMask = Array2<bool>;

/// Classification raster holding `WaterClass` codes
pub type ClassificationRaster = Raster<u8>;

/// Length of one degree of latitude, and of longitude at the equator
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Coordinate system enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Geographic coordinates (latitude, longitude)
    Geographic,
    /// Projected coordinates (e.g., UTM)
    Projected { epsg: u32 },
}

/// Polarization modes for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

/// Sentinel-1 acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionMode {
    IW, // Interferometric Wide swath
    EW, // Extra Wide swath
    SM, // StripMap
    WV, // Wave
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    /// Absolute pixel size (x, y) in CRS units
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }
}

/// Fixed footprint shared by every raster of a run: shape, pixel size and CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterGrid {
    pub rows: usize,
    pub cols: usize,
    pub geo_transform: GeoTransform,
    pub coordinate_system: CoordinateSystem,
}

impl RasterGrid {
    pub fn new(
        rows: usize,
        cols: usize,
        geo_transform: GeoTransform,
        coordinate_system: CoordinateSystem,
    ) -> Self {
        Self {
            rows,
            cols,
            geo_transform,
            coordinate_system,
        }
    }

    /// Metric grid anchored at the origin, mostly useful for synthetic data
    pub fn with_pixel_size(rows: usize, cols: usize, pixel_size_m: f64) -> Self {
        Self::new(
            rows,
            cols,
            GeoTransform::north_up(0.0, 0.0, pixel_size_m),
            CoordinateSystem::Projected { epsg: 3857 },
        )
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn pixel_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Ground size (x, y) of one cell in meters.
    ///
    /// Geographic grids are converted at the grid's centre latitude.
    pub fn pixel_size_m(&self) -> (f64, f64) {
        let (w, h) = self.geo_transform.pixel_size();
        match self.coordinate_system {
            CoordinateSystem::Projected { .. } => (w, h),
            CoordinateSystem::Geographic => {
                let gt = &self.geo_transform;
                let center_lat = gt.top_left_y + gt.pixel_height * self.rows as f64 / 2.0;
                (
                    w * METERS_PER_DEGREE * center_lat.to_radians().cos().abs(),
                    h * METERS_PER_DEGREE,
                )
            }
        }
    }

    /// Ground area of one cell in square meters
    pub fn pixel_area_sqm(&self) -> f64 {
        let (x_m, y_m) = self.pixel_size_m();
        x_m * y_m
    }

    pub fn matches(&self, other: &RasterGrid) -> bool {
        let (w, h) = self.geo_transform.pixel_size();
        let (ow, oh) = other.geo_transform.pixel_size();
        self.dim() == other.dim()
            && self.coordinate_system == other.coordinate_system
            && relative_eq!(w, ow, max_relative = 1e-9)
            && relative_eq!(h, oh, max_relative = 1e-9)
    }

    pub fn ensure_matches(&self, other: &RasterGrid, context: &str) -> FloodResult<()> {
        if self.matches(other) {
            return Ok(());
        }
        Err(FloodError::Configuration(format!(
            "{}: grid {}x{} @ {:?} does not match {}x{} @ {:?}",
            context,
            self.rows,
            self.cols,
            self.geo_transform.pixel_size(),
            other.rows,
            other.cols,
            other.geo_transform.pixel_size(),
        )))
    }
}

/// Georeferenced 2D raster. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    grid: RasterGrid,
    data: Array2<T>,
}

impl<T> Raster<T> {
    /// Wrap an array, checking its shape against the grid
    pub fn new(grid: RasterGrid, data: Array2<T>) -> FloodResult<Self> {
        if data.dim() != grid.dim() {
            return Err(FloodError::Configuration(format!(
                "Raster data shape {:?} does not match grid {:?}",
                data.dim(),
                grid.dim()
            )));
        }
        Ok(Self { grid, data })
    }

    pub fn grid(&self) -> &RasterGrid {
        &self.grid
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn into_data(self) -> Array2<T> {
        self.data
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Apply `f` per pixel, keeping the grid
    pub fn map<U, F>(&self, f: F) -> Raster<U>
    where
        F: FnMut(&T) -> U,
    {
        Raster {
            grid: self.grid,
            data: self.data.map(f),
        }
    }

    /// Construct from an array whose shape is already known to match `grid`
    pub(crate) fn from_parts(grid: RasterGrid, data: Array2<T>) -> Self {
        debug_assert_eq!(data.dim(), grid.dim());
        Self { grid, data }
    }
}

impl<T: Clone> Raster<T> {
    pub fn filled(grid: RasterGrid, value: T) -> Self {
        Self {
            data: Array2::from_elem(grid.dim(), value),
            grid,
        }
    }
}

impl<T: Clone + Zero> Raster<T> {
    pub fn zeros(grid: RasterGrid) -> Self {
        Self {
            data: Array2::zeros(grid.dim()),
            grid,
        }
    }
}

impl Raster<bool> {
    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}

/// Surface water classes. Discriminants are the raster codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WaterClass {
    Unclassified = 0,
    Perennial = 1,
    NonWater = 2,
    Seasonal = 3,
    Flood = 4,
    NewPerennial = 5,
}

impl WaterClass {
    pub const ALL: [WaterClass; 6] = [
        WaterClass::Unclassified,
        WaterClass::Perennial,
        WaterClass::NonWater,
        WaterClass::Seasonal,
        WaterClass::Flood,
        WaterClass::NewPerennial,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }
}

impl std::fmt::Display for WaterClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WaterClass::Unclassified => "unclassified",
            WaterClass::Perennial => "perennial water",
            WaterClass::NonWater => "non-water",
            WaterClass::Seasonal => "seasonal water",
            WaterClass::Flood => "flood water",
            WaterClass::NewPerennial => "new perennial water",
        };
        write!(f, "{}", name)
    }
}

/// One backscatter acquisition, already clipped to the area of interest
#[derive(Debug, Clone)]
pub struct Scene {
    pub acquired: DateTime<Utc>,
    pub footprint: BoundingBox,
    pub polarization: Polarization,
    pub mode: AcquisitionMode,
    pub backscatter: BackscatterImage,
}

/// Water mask for one fixed-length period of a year's active window
#[derive(Debug, Clone)]
pub struct PeriodMask {
    pub year: i32,
    pub period_index: usize,
    pub start: DateTime<Utc>,
    /// False when the period had no scenes and its mask was carried forward
    pub has_new_data: bool,
    pub water: Raster<bool>,
}

/// Ordered period masks of one year
#[derive(Debug, Clone)]
pub struct YearSeries {
    pub year: i32,
    pub periods: Vec<PeriodMask>,
}

impl YearSeries {
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn period(&self, period_index: usize) -> Option<&PeriodMask> {
        self.periods.iter().find(|p| p.period_index == period_index)
    }
}

/// Error types for flood mapping
#[derive(Debug, thiserror::Error)]
pub enum FloodError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Acquisition error: {0}")]
    Acquisition(String),
}

/// Result type for flood mapping operations
pub type FloodResult<T> = Result<T, FloodError>;
