//! Action device commands.

use crate::cli::{ActionArgs, GlobalOpts};
use crate::error::CliError;

use super::{Session, util};

pub async fn handle(session: &Session, args: &ActionArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let id = util::resolve_device(&session.controller, &args.device)?;
    session.controller.execute_action(&id, args.value).await?;
    if !global.quiet {
        eprintln!("Sent '{}' to {id}", args.value);
    }
    Ok(())
}
