//! Show command - displays information.

use anyhow::Result;

use usbforge::config::Config;
use usbforge::descriptor;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show the boot-menu descriptor for a set of image names
    Descriptor { images: Vec<String> },
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Descriptor { images } => {
            let families: Vec<&str> = config.icons.keys().map(String::as_str).collect();
            let menu =
                descriptor::generate_descriptor(&images, &config.bootmenu.gfxmode, &families);
            println!("{}", serde_json::to_string_pretty(&menu)?);
        }
    }
    Ok(())
}
