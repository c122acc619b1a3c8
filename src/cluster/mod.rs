//! Sample distances and hierarchical clustering.

pub mod distance;
pub mod ward;

pub use distance::{aitchison_distances, euclidean_distances, DistanceMatrix};
pub use ward::{ward_linkage, Dendrogram, Merge};
