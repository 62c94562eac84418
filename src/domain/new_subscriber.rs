use serde::Deserialize;

use crate::domain::attribution_tag::AttributionTag;
use crate::domain::subscriber_email::SubscriberEmail;

const DEFAULT_SOURCE: &str = "website";

#[derive(Debug)]
pub struct NewSubscriber {
    pub email: SubscriberEmail,
    pub source: AttributionTag,
    pub utm_source: Option<AttributionTag>,
    pub utm_medium: Option<AttributionTag>,
    pub utm_campaign: Option<AttributionTag>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscriberBody {
    pub email: String,
    pub consent: Option<bool>,
    pub source: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

impl NewSubscriberBody {
    /// Consent only counts when it was explicitly given.
    pub fn has_explicit_consent(&self) -> bool {
        self.consent == Some(true)
    }
}

impl TryFrom<&NewSubscriberBody> for NewSubscriber {
    type Error = String;

    fn try_from(body: &NewSubscriberBody) -> Result<Self, Self::Error> {
        let email = SubscriberEmail::parse(body.email.clone())?;
        let source = AttributionTag::parse_optional(body.source.clone())?
            .unwrap_or(AttributionTag::parse(DEFAULT_SOURCE.to_string())?);

        Ok(NewSubscriber {
            email,
            source,
            utm_source: AttributionTag::parse_optional(body.utm_source.clone())?,
            utm_medium: AttributionTag::parse_optional(body.utm_medium.clone())?,
            utm_campaign: AttributionTag::parse_optional(body.utm_campaign.clone())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{NewSubscriber, NewSubscriberBody};
    use claim::{assert_err, assert_ok};

    fn body(email: &str, source: Option<&str>) -> NewSubscriberBody {
        NewSubscriberBody {
            email: email.to_string(),
            consent: Some(true),
            source: source.map(String::from),
            utm_source: None,
            utm_medium: Some("".to_string()),
            utm_campaign: None,
        }
    }

    #[test]
    fn missing_source_defaults_to_website() {
        let new_subscriber = NewSubscriber::try_from(&body("frank@test.com", None)).unwrap();

        assert_eq!(new_subscriber.source.as_ref(), "website");
        assert!(new_subscriber.utm_medium.is_none());
    }

    #[test]
    fn invalid_email_is_rejected() {
        assert_err!(NewSubscriber::try_from(&body("frank.test.com", None)));
    }

    #[test]
    fn invalid_source_is_rejected() {
        assert_err!(NewSubscriber::try_from(&body("frank@test.com", Some("{x}"))));
        assert_ok!(NewSubscriber::try_from(&body("frank@test.com", Some("footer"))));
    }

    #[test]
    fn consent_must_be_explicitly_true() {
        let mut body = body("frank@test.com", None);
        assert!(body.has_explicit_consent());

        body.consent = Some(false);
        assert!(!body.has_explicit_consent());

        body.consent = None;
        assert!(!body.has_explicit_consent());
    }
}
