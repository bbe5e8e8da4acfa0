//! Summary statistics for score series.
//!
//! Training runs produce long `(elapsed minutes, score)` series. This crate condenses them into
//! a few numbers that can be compared between sessions of a campaign:
//!
//! - [`descriptive`]: minimum, maximum, mean, median and spread of the scores
//! - [`percentiles`]: nearest-rank percentiles of the scores
//! - [`series`]: both of the above plus the time span covered by a series
//!
//! # Examples
//!
//! ```
//! use retrotrack_stats::series::SeriesReport;
//!
//! let points = [(0.0, 10.0), (1.0, 30.0), (2.0, 20.0)];
//! let report = SeriesReport::new(points, &[50.0]).unwrap();
//! assert_eq!(report.scores.max, 30.0);
//! assert_eq!(report.last_minute, 2.0);
//! ```

pub mod descriptive;
pub mod percentiles;
pub mod series;
