//! Live session against the OpenAI Realtime API.
//!
//! Needs `OPENAI_API_KEY`, a microphone, speakers and network access, so the
//! tests are `#[ignore]` and run manually:
//!
//! ```bash
//! cargo test -p voicewire --features desktop-audio \
//!     --test live_session_tests -- --ignored
//! ```

#![cfg(feature = "desktop-audio")]

use std::sync::Arc;
use std::time::Duration;

use voicewire::codec::OpusDecoderFactory;
use voicewire::device::{CpalCapture, CpalSinkFactory};
use voicewire::rtc::WebRtcTransport;
use voicewire::{SessionConfig, VoiceSessionBuilder};

#[tokio::test(flavor = "multi_thread")]
#[ignore]
async fn test_live_session_receives_audio_track() {
    let api_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY env var is required");
    let config = SessionConfig::default().with_http_timeout(Duration::from_secs(20));

    let transport = Arc::new(WebRtcTransport::new(&config).await.unwrap());
    let session = VoiceSessionBuilder::new(config)
        .api_key(api_key)
        .decoders(Arc::new(OpusDecoderFactory))
        .sinks(Arc::new(CpalSinkFactory::new()))
        .connect(transport, &CpalCapture::new())
        .await
        .expect("failed to establish live session");

    let mut announced = false;
    for _ in 0..100 {
        if !session.consumers().is_empty() {
            announced = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(announced, "no remote audio track announced within 10s");

    session.close().await.unwrap();
}
