mod admin;
mod consent;
mod email_verification;
mod gdpr;
mod health_check;
mod helpers;
mod subscriptions;
mod unsubscribe;
