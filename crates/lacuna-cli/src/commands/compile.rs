use super::{json_pretty, load_config, EXIT_SUCCESS};
use lacuna_schema::{AnnotationCompiler, Subscription};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

pub fn run(
    config_path: Option<&Path>,
    service: &str,
    file: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let input = match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            buf
        }
    };
    let labels: BTreeMap<String, String> = serde_json::from_str(&input)
        .map_err(|e| format!("labels must be a JSON object of strings: {e}"))?;

    let compilation =
        AnnotationCompiler::new(&config.label_prefix).compile_with_report(service, &labels);
    let issues: Vec<String> = compilation.issues.iter().map(ToString::to_string).collect();

    if json {
        println!(
            "{}",
            json_pretty(&serde_json::json!({
                "subscriptions": compilation.subscriptions,
                "issues": issues,
            }))?
        );
    } else {
        if compilation.subscriptions.is_empty() {
            println!("no subscriptions found");
        }
        for subscription in &compilation.subscriptions {
            print_subscription(subscription);
        }
        for issue in &issues {
            eprintln!("warning: {issue}");
        }
    }
    Ok(EXIT_SUCCESS)
}

fn print_subscription(s: &Subscription) {
    println!("{}", s.id());
    println!("  topic:    {}", s.topic());
    println!("  endpoint: {}", s.endpoint());
    if let Some(d) = s.ack_deadline() {
        println!("  ack-deadline: {}s", d.as_secs());
    }
    if s.retain_acked_messages() {
        println!("  retain-acked-messages: true");
    }
    if let Some(d) = s.retention_duration() {
        println!("  retention-duration: {}s", d.as_secs());
    }
    if s.enable_ordering() {
        println!("  enable-ordering: true");
    }
    if let Some(d) = s.expiration_ttl() {
        println!("  expiration-ttl: {}s", d.as_secs());
    }
    if let Some(f) = s.filter() {
        println!("  filter: {f}");
    }
    if s.deliver_exactly_once() {
        println!("  deliver-exactly-once: true");
    }
    if let Some(t) = s.dead_letter_topic() {
        println!("  dead-letter-topic: {t}");
    }
    if let Some(n) = s.max_dead_letter_delivery_attempts() {
        println!("  max-dead-letter-delivery-attempts: {n}");
    }
    if let Some(d) = s.retry_minimum_backoff() {
        println!("  retry-minimum-backoff: {}s", d.as_secs());
    }
    if let Some(d) = s.retry_maximum_backoff() {
        println!("  retry-maximum-backoff: {}s", d.as_secs());
    }
}
