pub mod ab_shift;
pub mod analytics;
pub mod bounce_processor;
pub mod campaign_scheduler;
pub mod email_sender;
pub mod email_verifier;
pub mod encryption;
pub mod health_monitor;
pub mod health_score;
pub mod job_queue;
pub mod kv_store;
pub mod lead_state;
pub mod reply_classifier;
pub mod reply_processor;
pub mod send_window;
pub mod template_engine;
pub mod variant_selection;
pub mod warmup_service;
pub mod warmup_tables;
