use super::{CompanyId, UserId};
use chrono::{DateTime, Utc};

/// Who is acting, for which company, and at what instant.
///
/// Every service operation takes one of these instead of reading ambient
/// "current user" state. `now` is used for audit timestamps only; money is
/// always valued at an explicit business date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationContext {
    pub company: CompanyId,
    pub user: UserId,
    pub now: DateTime<Utc>,
}

impl OperationContext {
    pub fn new(company: CompanyId, user: UserId) -> Self {
        Self::at(company, user, Utc::now())
    }

    pub fn at(company: CompanyId, user: UserId, now: DateTime<Utc>) -> Self {
        Self { company, user, now }
    }
}
