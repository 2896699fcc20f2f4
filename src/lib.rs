/*!
lanyard: a student-ID-card record service.

Administrators register students (one at a time or from an uploaded .csv
roster), attach an optional photo, and pull the data needed to preview and
print digital ID cards. The `store` module owns the records; `import` turns
roster files into records; `inter` is the HTTP face.
*/

pub mod config;
pub mod import;
pub mod inter;
pub mod media;
pub mod store;
pub mod student;

pub fn log_level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("LOG_LEVEL") {
        Err(_) => { return LevelFilter::Warn; },
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    match level_string.as_str() {
        "max" => LevelFilter::max(),
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}
