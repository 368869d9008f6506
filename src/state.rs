use std::sync::Arc;

use crate::config::Settings;
use crate::translate::TranslationService;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub translation: TranslationService,
}

impl AppState {
    /// State with an empty model slot, filled once loading finishes
    pub fn new(settings: Settings) -> Self {
        let translation = TranslationService::new(&settings.inference);
        Self::with_translation(settings, translation)
    }

    pub fn with_translation(settings: Settings, translation: TranslationService) -> Self {
        Self {
            settings: Arc::new(settings),
            translation,
        }
    }
}
