pub mod membership;
pub mod mfa;
pub mod privilege;

pub use membership::MembershipStage;
pub use mfa::MfaStage;
pub use privilege::PrivilegeStage;
