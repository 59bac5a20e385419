//! Gridded ensemble climate analysis.
//!
//! Datasets live in a content addressed chunk store and are found through a YAML catalog. Arrays
//! over their variables are lazy: operations build a graph which a `Cluster` evaluates on a pool
//! of workers, reading only the chunks the graph needs. Results can be rendered to SVG figures.
//!
mod analysis;
mod array;
mod cache;
mod calendar;
mod catalog;
mod chunk;
mod cluster;
mod compute;
mod coords;
mod dataset;
mod errors;
mod extio;
mod geom;
mod helpers;
mod kernels;
mod loader;
mod mapper;
mod materialized;
mod node;
pub mod plot;
mod progress;
mod range;
mod resolver;
mod store;
mod synth;
mod time;

#[cfg(test)]
mod testing;

pub use analysis::{
    elevation_map, ensemble_spread, regional_annual_max, seasonal_precipitation,
    seasonal_snowfall, AnalysisConfig, DEFAULT_CENTER, DEFAULT_HALF_WIDTH,
};
pub use array::DataArray;
pub use calendar::{Frequency, Season, TimeAttribute};
pub use catalog::{Catalog, CatalogEntry, CatalogMetadata, Listing, Source, StoreLocation};
pub use cluster::{Cluster, ClusterConfig};
pub use coords::{Coord, CoordValues};
pub use dataset::{Dataset, Dim, Variable};
pub use errors::{Error, Result};
pub use geom::BoundingBox;
pub use kernels::{Aggregator, Arithmetic, Comparison};
pub use loader::{open_dataset, open_entry, open_local_store};
pub use mapper::{Mapper, StoreWrite};
pub use materialized::Materialized;
pub use progress::{NoProgress, Progress, ProgressReporter};
pub use range::{FloatRange, IntRange};
pub use resolver::{LsEntry, Resolver};
pub use store::{cid_for, BufferedWrite, FileMapper, MemoryMapper, ObjectSink};
pub use synth::{synthesize, SynthConfig};
pub use time::{date, timestamp, TimeRange};

pub use cid::Cid;
