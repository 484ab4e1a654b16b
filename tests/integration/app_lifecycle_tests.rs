/*!
 * Tests for the application lifecycle: configuration to controller to finished run
 */

use std::sync::Arc;
use anyhow::Result;
use subtrans::app_config::{Config, TranslationProvider};
use subtrans::app_controller::Controller;
use subtrans::providers::{self, mock::MockProvider};
use crate::common::{self, RecordingObserver};

/// Test that a controller cannot be built without an API key
#[test]
fn test_controller_withDefaultConfig_shouldRequireApiKey() {
    let result = Controller::with_config(Config::default());
    assert!(result.is_err());
}

/// Test that a valid configuration builds a controller for each real backend
#[test]
fn test_controller_withApiKey_shouldBuildForEveryProvider() -> Result<()> {
    for provider in [TranslationProvider::Gemini, TranslationProvider::OpenAI] {
        let mut config = common::test_config();
        config.translation.provider = provider;
        config.set_api_key("key");

        let built = providers::create_provider(&config)?;
        assert_eq!(built.name(), provider.to_lowercase_string());

        let controller = Controller::with_config(config)?;
        assert_eq!(controller.config().translation.provider, provider);
    }
    Ok(())
}

/// Test that zero workers in the configuration is refused up front
#[test]
fn test_controller_withZeroWorkers_shouldFail() {
    let mut config = common::test_config();
    config.translation.common.workers = 0;

    assert!(Controller::with_config(config.clone()).is_err());
    assert!(Controller::with_provider(config, Arc::new(MockProvider::working())).is_err());
}

/// Test a full run driven from a blocking context
#[test]
fn test_full_lifecycle_withMockBackend_shouldTranslateTwiceIdempotently() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_numbered_subtitle(temp_dir.path(), "pilot.srt", 15)?;
    let mock = MockProvider::working();
    let observer = RecordingObserver::new();

    let controller = Controller::with_provider(common::test_config(), Arc::new(mock.clone()))?
        .with_observer(observer.clone())
        .with_settings(common::fast_settings(4, 3, 2));
    let output = controller.output_path_for(&input);

    let first = tokio_test::block_on(controller.translate_file(&input, &output))?;
    assert_eq!(first.translated, 15);
    let calls = mock.request_count();
    let written = std::fs::read_to_string(&output)?;

    // the checkpoint was removed, so a second run translates again and writes the same file
    let second = tokio_test::block_on(controller.translate_file(&input, &output))?;
    assert_eq!(second.translated, 15);
    assert_eq!(mock.request_count(), calls * 2);
    assert_eq!(std::fs::read_to_string(&output)?, written);
    assert!(observer.count("completed") > 0);
    Ok(())
}
