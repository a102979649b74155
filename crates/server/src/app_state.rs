use session_tokens::TokenConfig;

use crate::{api::ChatDirectory, hub::Hub};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) directory: ChatDirectory,
    pub(crate) hub: Hub,
    pub(crate) tokens: TokenConfig,
}

impl AppState {
    pub(crate) fn new(tokens: TokenConfig) -> Self {
        Self {
            directory: ChatDirectory::default(),
            hub: Hub::default(),
            tokens,
        }
    }
}
