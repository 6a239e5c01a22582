//! Clear command implementation.

use std::io::Write;

use lama_logs::{DeleteScope, LogStore};

use crate::cli::ClearArgs;
use crate::error::CliError;
use crate::output::{Message, OutputFormat};

/// Handler for the clear command.
pub struct ClearCommand<'a> {
    store: &'a LogStore,
}

impl<'a> ClearCommand<'a> {
    /// Creates a new clear command handler.
    #[must_use]
    pub const fn new(store: &'a LogStore) -> Self {
        Self { store }
    }

    /// Executes the clear command. Without filters every record goes;
    /// collector positions are kept either way.
    ///
    /// # Errors
    ///
    /// Returns error if `--yes` is missing, the filters are invalid or the
    /// delete fails.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &ClearArgs,
    ) -> Result<(), CliError> {
        if !args.yes {
            return Err(CliError::InvalidArgument(
                "refusing to delete records without --yes".into(),
            ));
        }

        let scope = if args.filter.is_empty() {
            DeleteScope::All
        } else {
            DeleteScope::Matching(args.filter.to_request().filter()?)
        };
        let deleted = self.store.delete(&scope)?;
        format.write(out, &Message::success(format!("Deleted {deleted} record(s)")))
    }
}
