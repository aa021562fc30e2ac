use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::commands::executable::Executable;
use crate::commands::{strip_shared_prefix, CommandError, CommandParser};
use crate::flags::Flags;
use crate::frame::Response;
use crate::pagination;
use crate::sort::SortOrder;
use crate::store::Store;

/// Lists the keys below `path`, optionally with their values, as one row per key followed by an
/// empty line.
#[derive(Debug, PartialEq)]
pub struct Iterate {
    pub flags: Flags,
    /// Maximum number of rows, zero for no limit.
    pub limit: usize,
    pub path: String,
    pub user: String,
}

impl Iterate {
    pub fn sort_order(&self) -> Option<SortOrder> {
        if self.flags.contains(Flags::SORT_BY_KEY) {
            Some(SortOrder::Key)
        } else if self.flags.contains(Flags::SORT_BY_VALUE) {
            Some(SortOrder::Value)
        } else {
            None
        }
    }

    pub fn with_values(&self) -> bool {
        !self.flags.contains(Flags::NO_VALUE)
    }

    /// The namespace prefix to restore on every result key, and the pattern to scan for.
    pub fn pattern(&self) -> (&'static str, String) {
        let pattern = if self.flags.contains(Flags::EXACT_KEY) {
            self.path.clone()
        } else {
            format!("{}*", self.path)
        };

        let (prefix, stripped) = strip_shared_prefix(&pattern);
        (prefix, stripped.to_string())
    }
}

#[async_trait]
impl Executable for Iterate {
    async fn exec(
        self,
        store: &Store,
        cancel: &CancellationToken,
    ) -> Result<Vec<Response>, CommandError> {
        if self.flags.contains(Flags::RECURSE) {
            info!("Recursion to all sub-hierarchies was requested");
        }

        let (prefix, pattern) = self.pattern();
        if !prefix.is_empty() {
            debug!(pattern = %pattern, "Stripped the shared prefix");
        }
        info!(
            pattern = %pattern,
            flags = ?self.flags,
            limit = self.limit,
            "Received an iterate request"
        );

        let with_values = self.with_values();
        let mut pairs =
            pagination::collect(store, cancel, &pattern, with_values, self.limit).await?;

        if let Some(order) = self.sort_order() {
            order.sort(&mut pairs);
        }

        let mut responses = Vec::with_capacity(pairs.len() + 1);
        for pair in pairs {
            let key = format!("{}{}", prefix, pair.key);
            if with_values {
                responses.push(Response::ok([key, pair.value]));
            } else {
                responses.push(Response::ok([key]));
            }
        }
        responses.push(Response::End);

        Ok(responses)
    }
}

impl TryFrom<&mut CommandParser> for Iterate {
    type Error = CommandError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let flags = Flags::parse(&parser.next_string()?).map_err(CommandError::MalformedFlags)?;

        if flags.contains(Flags::ASYNC) {
            return Err(CommandError::AsyncIteration);
        }
        if flags.contains(Flags::SORT_BY_KEY) && flags.contains(Flags::SORT_BY_VALUE) {
            return Err(CommandError::ConflictingSortOrder);
        }

        let limit = parser
            .next_string()?
            .parse::<i64>()
            .map_err(CommandError::MalformedRowLimit)?;
        // Negative limits are as good as none.
        let limit = usize::try_from(limit).unwrap_or(0);

        let path = parser.next_string()?;
        let user = parser.next_string()?;

        Ok(Self {
            flags,
            limit,
            path,
            user,
        })
    }
}
