//! Topic ownership and subscriber resolution.

mod topic_registry;

pub use topic_registry::{topic_name_for_route, Topic, TopicRegistry};
