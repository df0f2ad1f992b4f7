//! Doctor command

use anyhow::Result;
use ghost_lifecycle::doctor::{doctor_runner, Category, DoctorContext};

use super::Session;
use crate::cli::DoctorArgs;

pub async fn run(session: &Session, args: DoctorArgs) -> Result<()> {
    let ui = session.ui();
    let mut instance = session.system.get_instance(&session.dir);
    let installed = instance.cli_config().exists();
    if installed {
        instance.check_environment();
    }

    let mut ctx = DoctorContext::new(instance, default_categories(args.categories, installed));
    doctor_runner()?.run(&mut ctx, ui.renderer()).await?;
    ui.success("All checks passed");
    Ok(())
}

/// Inside an existing installation the install checks make no sense
/// unless asked for
fn default_categories(requested: Vec<Category>, installed: bool) -> Vec<Category> {
    match (requested.is_empty(), installed) {
        (true, true) => vec![Category::Start, Category::Setup],
        _ => requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_categories() {
        assert_eq!(
            default_categories(vec![], true),
            [Category::Start, Category::Setup]
        );
        assert!(default_categories(vec![], false).is_empty());
        assert_eq!(
            default_categories(vec![Category::Install], true),
            [Category::Install]
        );
    }
}
