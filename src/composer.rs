use crate::llm::{LlmClient, LlmError, LlmMessage};
use crate::models::Listing;
use tracing::{debug, warn};

/// Single-turn text generation.
pub trait TextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self
            .chat(&[LlmMessage {
                role: "user".into(),
                content: prompt.to_string(),
            }])
            .await?;
        if let Some(usage) = &response.usage {
            debug!(
                target = "lowball.composer",
                prompt_tokens = ?usage.prompt_tokens,
                completion_tokens = ?usage.completion_tokens,
                "llm usage"
            );
        }
        Ok(response.text)
    }
}

/// `floor(price × fraction)`, clamped at zero.
pub fn offer_price(price: f64, fraction: f64) -> u64 {
    let offer = (price * fraction).floor();
    if offer.is_finite() && offer > 0.0 {
        offer as u64
    } else {
        0
    }
}

pub fn build_prompt(listing: &Listing, offer: u64) -> String {
    format!(
        "You are a haggling buyer on Grailed. Write a short message to the seller lowballing the following item:
Item: {title}
Current Price: ${price}
Condition: {condition}
Description: {description}
Offer Price: ${offer}

The message should:
 - be short
 - round the offer down to the nearest 10 or 100 (2050 becomes 2000)
 - be creative, you are trying to squeeze them
 - never sign off
 - be a little obnoxious and act like the item is worth far less than they are asking
 - bargain comically like a greasy pawnshop clerk, crack a joke, lightly roast the item
 - include the specific offer amount of ${offer}",
        title = listing.title,
        price = listing.price,
        condition = listing.condition_label(),
        description = listing.description_or_placeholder(),
    )
}

pub fn fallback_message(listing: &Listing, offer: u64) -> String {
    format!(
        "Hi! I'm interested in your {}. Would you consider {offer}? Thanks!",
        listing.title
    )
}

pub struct MessageComposer<G> {
    generator: G,
    lowball_fraction: f64,
}

impl<G: TextGenerator> MessageComposer<G> {
    pub fn new(generator: G, lowball_fraction: f64) -> Self {
        Self {
            generator,
            lowball_fraction,
        }
    }

    /// Always yields usable text: generator output when it works, the template otherwise.
    pub async fn compose(&self, listing: &Listing) -> String {
        let offer = offer_price(listing.price, self.lowball_fraction);
        let prompt = build_prompt(listing, offer);
        match self.generator.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!(target = "lowball.composer", listing_id = %listing.id, offer, "generated message");
                text.trim().to_string()
            }
            Ok(_) => {
                warn!(target = "lowball.composer", listing_id = %listing.id, "generator returned empty text, using template");
                fallback_message(listing, offer)
            }
            Err(err) => {
                warn!(target = "lowball.composer", listing_id = %listing.id, error = %err, "error generating message, using template");
                fallback_message(listing, offer)
            }
        }
    }

    #[cfg(test)]
    pub fn generator(&self) -> &G {
        &self.generator
    }
}
