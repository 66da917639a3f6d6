// Static output-latency estimates per playback environment
// Matched against a free-form identifier such as a user agent or device name

/// Environment markers and their typical output latency in milliseconds
///
/// Order matters: the first marker found wins, so wireless output is checked
/// before the platform it runs on.
const LATENCY_TABLE: &[(&str, f64)] = &[
    ("bluetooth", 200.0),
    ("airpods", 180.0),
    ("wireless", 150.0),
    ("android", 120.0),
    ("iphone", 60.0),
    ("ipad", 60.0),
    ("windows", 70.0),
    ("macintosh", 40.0),
    ("mac os", 40.0),
    ("linux", 60.0),
];

/// Heuristic base offset for an environment, if any marker matches
pub fn lookup(environment: &str) -> Option<f64> {
    let environment = environment.to_lowercase();
    LATENCY_TABLE
        .iter()
        .find(|(marker, _)| environment.contains(marker))
        .map(|(_, ms)| *ms)
}

/// Heuristic base offset, falling back to `default_ms`
pub fn base_offset_for(environment: &str, default_ms: f64) -> f64 {
    lookup(environment).unwrap_or(default_ms)
}
