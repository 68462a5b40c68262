//! Services composing the store and the domain engines.

pub mod issue_service;

pub use issue_service::{
    CommentView, ImageUpload, IssueCard, IssueDetail, IssueService, ReportIssue,
};
