use settings_kit::{logging, AppDescriptor, AppRegistry, Palette, Settings};

fn main() -> Result<(), settings_kit::SettingsError> {
    let registry = AppRegistry::from_iter([
        AppDescriptor::new("sessions"),
        AppDescriptor::new("accounts")
            .requires(["sessions"])
            .context_processors(["accounts.context.current_user"]),
        AppDescriptor::new("dashboard").requires(["accounts"]),
    ]);

    let settings = Settings::builder()
        .with_file("demos/settings.toml", true)
        .with_env("DEMO", "__")
        .with_local_overrides("local")
        .with_secret_key_file("demos/secret.txt")
        .with_app_registry(registry)
        .load()?;

    // Colorize log output per the [logging.colors] block
    let palette = Palette::from_settings(&settings)?;
    logging::try_init(palette).ok();

    tracing::info!(target: "demo", "settings loaded");

    println!("debug: {}", settings.get_bool("debug").unwrap_or(false));
    println!(
        "database url: {}",
        settings.get_str("database.url").unwrap_or("-")
    );
    println!(
        "installed apps: {:?}",
        settings.get_string_array("installed_apps")?.unwrap_or_default()
    );
    println!(
        "secret key: {} chars (demos/secret.txt)",
        settings.get_str("secret_key").map(str::len).unwrap_or(0)
    );

    Ok(())
}
