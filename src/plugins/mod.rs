pub mod csproj_reader;
pub mod git_branch;
pub mod nuget_feed;

pub use csproj_reader::CsprojReader;
pub use git_branch::GitBranchResolver;
pub use nuget_feed::NuGetFeed;
