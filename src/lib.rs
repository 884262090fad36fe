pub mod apps;
pub mod choices;
pub mod deprecation;
pub mod logging;
pub mod secret;
pub mod settings;
pub mod templates;

pub use apps::{AppDescriptor, AppRegistry, ProcessorDecl};
pub use choices::Choices;
pub use logging::{Color, Palette, SourceColorize, Style};
pub use secret::SecretKeyFile;
pub use settings::{Settings, SettingsBuilder, SettingsError};
