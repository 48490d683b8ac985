use thiserror::Error;

/// Failure of a battle operation.
///
/// Every variant is raised before any state is touched, so a caller that gets
/// an error can assume the group, its ledger and its subscriptions are exactly
/// as they were.
#[derive(Debug, Error)]
pub enum BattleError {
    /// A caller-supplied value violates a precondition.
    #[error("{0}")]
    Input(String),

    /// The operation is not valid for the group's current state.
    #[error("{0}")]
    Group(String),

    /// The caller lacks the role the operation needs.
    #[error("{0}")]
    User(String),

    #[error("member is not in this clan")]
    UserNotInGroup,

    #[error("clan does not exist")]
    GroupNotExist,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BattleError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn group(msg: impl Into<String>) -> Self {
        Self::Group(msg.into())
    }

    pub fn user(msg: impl Into<String>) -> Self {
        Self::User(msg.into())
    }

    /// Short stable code for the boundary layer.
    pub fn code(&self) -> &'static str {
        match self {
            BattleError::Input(_) => "input",
            BattleError::Group(_) => "group",
            BattleError::User(_) => "user",
            BattleError::UserNotInGroup => "not_in_group",
            BattleError::GroupNotExist => "no_group",
            BattleError::Internal(_) => "server_error",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, BattleError::Internal(_))
    }
}

pub type BattleResult<T> = Result<T, BattleError>;

#[cfg(test)]
mod tests {
    use super::BattleError;

    #[test]
    fn codes_and_messages() {
        let e = BattleError::input("boss 3 is already dead");
        assert_eq!(e.code(), "input");
        assert_eq!(e.to_string(), "boss 3 is already dead");

        let e: BattleError = anyhow::anyhow!("disk full").into();
        assert!(e.is_internal());
        assert_eq!(e.code(), "server_error");
        assert_eq!(BattleError::GroupNotExist.code(), "no_group");
    }
}
