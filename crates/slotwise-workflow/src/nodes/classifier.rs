//! Intent classification. Always produces an intent; anything unclear is
//! `UNKNOWN`.

use tracing::{info, warn};

use super::{StepContext, value_str};
use crate::error::Result;
use crate::extract::ExtractionSchema;
use crate::state::{Intent, RunState, StateDelta};

pub async fn classify_intent(ctx: &StepContext<'_>, state: &RunState) -> Result<StateDelta> {
    let intent = match ctx.intent_hint {
        Some(hint) => {
            info!(node = "intent_classifier", intent = ?hint, "using intent hint");
            hint
        }
        None => match ctx
            .extractor
            .extract(&ctx.extraction_request(ExtractionSchema::Intent, state))
            .await
        {
            Ok(value) => value_str(&value["intent"])
                .and_then(Intent::from_label)
                .unwrap_or(Intent::Unknown),
            Err(e) => {
                warn!(node = "intent_classifier", error = %e, "classification failed");
                Intent::Unknown
            }
        },
    };

    info!(node = "intent_classifier", intent = ?intent, "intent classified");
    Ok(StateDelta {
        intent: Some(intent),
        ..StateDelta::default()
    })
}
