mod usage_record;

pub use usage_record::{day_bounds, format_canonical_ts, parse_canonical_ts, UsageRecord};
