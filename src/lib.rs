pub mod api;
pub mod core;

/// Installs the platform logger. On Android this routes `log` records to
/// logcat; elsewhere the host binary is expected to install its own logger.
pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("evidence_lens"),
        );
    }
}
