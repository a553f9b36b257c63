mod extracted;
pub use self::extracted::Extracted;

mod record;
pub use self::record::{
    ActionType, DetailRecord, FundingRange, MergedRecord, ProbabilityRate, SummaryRecord,
    NO_ACTION, NO_BUDGET, NO_DEADLINE, NO_FUNDING, NO_IDENTIFIER, NO_LINK, NO_STATUS,
    NO_SUBMISSION, NO_TITLE,
};
