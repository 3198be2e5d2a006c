pub mod pattern;
pub mod router;

pub use pattern::{ArchivePattern, FilenamePattern, PatternError, WILDCARD};
pub use router::{
    add_destination_path, route_file, select_archive, ArchiveRouter, ArchiveSelection,
    DestinationOutcome, DestinationStatus, RouteTarget, RoutingOutcome, RoutingStats,
};
