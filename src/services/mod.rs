pub mod collaborators;
pub mod dispatch_service;
pub mod fanout_service;
pub mod reconcile_service;
pub mod token_service;
