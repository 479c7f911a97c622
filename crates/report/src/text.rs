//! Plain-text rendering of a [`ReportDocument`].

use std::fmt::Write;
use tierbay_engine::{
    BucketAnalysis, MultipartAnalysis, PricingTable, Thresholds, TierCandidate, WasteEntry,
};

use crate::ReportDocument;

const WIDTH: usize = 80;
const TOP_PREFIXES: usize = 10;
const TOP_CANDIDATES: usize = 20;
const TOP_UPLOADS: usize = 50;

fn heavy_rule() -> String {
    "=".repeat(WIDTH)
}

fn light_rule() -> String {
    "-".repeat(WIDTH)
}

/// `1234567` becomes `1,234,567`.
fn grouped(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn clip(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

pub fn render_text(document: &ReportDocument) -> String {
    let mut out = String::new();
    let _ = write_report(&mut out, document);
    out
}

fn write_report(out: &mut String, document: &ReportDocument) -> std::fmt::Result {
    writeln!(out, "{}", heavy_rule())?;
    writeln!(out, "S3 COST OPTIMIZATION REPORT")?;
    writeln!(out, "Generated: {}", document.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(out, "Run ID: {}", document.run_id)?;
    writeln!(out, "{}\n", heavy_rule())?;

    write_summary(out, document)?;

    for analysis in &document.bucket_analyses {
        write_bucket(out, analysis, &document.pricing, &document.thresholds)?;
    }

    writeln!(out, "{}", heavy_rule())?;
    writeln!(out, "INCOMPLETE MULTIPART UPLOADS")?;
    writeln!(out, "{}\n", heavy_rule())?;
    for analysis in &document.multipart_analyses {
        write_multipart(out, analysis, &document.pricing, &document.thresholds)?;
    }

    write_recommendations(out, &document.thresholds)
}

fn write_summary(out: &mut String, document: &ReportDocument) -> std::fmt::Result {
    let summary = &document.summary;

    writeln!(out, "EXECUTIVE SUMMARY")?;
    writeln!(out, "{}", light_rule())?;
    writeln!(out, "Total Buckets Analyzed: {}", summary.total_buckets)?;
    if summary.failed_buckets > 0 {
        writeln!(out, "Buckets With Errors: {}", summary.failed_buckets)?;
    }
    writeln!(out, "Total Objects: {}", grouped(summary.total_objects))?;
    writeln!(out, "Total Storage: {:.2} GB", summary.total_size_gb)?;
    writeln!(
        out,
        "Potential Monthly Savings (IA Migration): ${:.2}",
        summary.potential_ia_savings_monthly
    )?;
    writeln!(
        out,
        "Potential Monthly Savings (Glacier Migration): ${:.2}",
        summary.potential_glacier_savings_monthly
    )?;
    writeln!(
        out,
        "Storage in Incomplete Multipart Uploads: {:.2} GB",
        summary.multipart_storage_gb
    )?;
    write!(
        out,
        "Estimated Monthly Cost of Multipart Storage: ${:.2}",
        summary.multipart_monthly_cost
    )?;
    if summary.multipart_cost_is_lower_bound {
        write!(
            out,
            " (lower bound, {} upload(s) of unknown size)",
            summary.multipart_unknown_size_uploads
        )?;
    }
    writeln!(out, "\n\n")
}

fn write_bucket(
    out: &mut String,
    analysis: &BucketAnalysis,
    pricing: &PricingTable,
    thresholds: &Thresholds,
) -> std::fmt::Result {
    writeln!(out, "{}", heavy_rule())?;
    writeln!(out, "BUCKET: {}", analysis.bucket_name)?;
    writeln!(out, "{}\n", heavy_rule())?;

    if let Some(error) = &analysis.error {
        return writeln!(out, "ERROR: {}\n", error);
    }

    writeln!(out, "Total Objects: {}", grouped(analysis.total_objects))?;
    writeln!(out, "Total Size: {:.2} GB\n", analysis.total_size_gb)?;

    writeln!(out, "STORAGE CLASS DISTRIBUTION")?;
    writeln!(out, "{}", light_rule())?;
    for (class, usage) in analysis.by_storage_class.iter() {
        writeln!(
            out,
            "{:<20}: {:>8} objects, {:>10.2} GB, ${:>8.2}/month",
            class.as_str(),
            grouped(usage.count),
            usage.size_gb,
            pricing.monthly_cost(class, usage.size_gb)
        )?;
    }
    writeln!(out)?;

    writeln!(out, "TOP {} PREFIXES BY SIZE", TOP_PREFIXES)?;
    writeln!(out, "{}", light_rule())?;
    for (prefix, usage) in analysis.by_prefix.largest(TOP_PREFIXES) {
        writeln!(
            out,
            "{:<60}: {:>8} objects, {:>10.2} GB",
            clip(prefix, 60),
            grouped(usage.count),
            usage.size_gb
        )?;
    }
    writeln!(out)?;

    if !analysis.candidates_for_ia.is_empty() {
        let mut by_size: Vec<&TierCandidate> = analysis.candidates_for_ia.iter().collect();
        by_size.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));

        writeln!(out, "CANDIDATES FOR STANDARD-IA (Top {} by size)", TOP_CANDIDATES)?;
        writeln!(out, "{}", light_rule())?;
        writeln!(out, "Total candidates: {}", analysis.candidates_for_ia.len())?;
        writeln!(out, "Potential monthly savings: ${:.2}\n", analysis.ia_savings_monthly())?;
        for candidate in by_size.into_iter().take(TOP_CANDIDATES) {
            writeln!(out, "  {}", clip(&candidate.key, 70))?;
            writeln!(
                out,
                "    Size: {:.4} GB, Age: {} days, Savings: ${:.2}/month",
                candidate.size_gb, candidate.age_days, candidate.potential_savings_monthly
            )?;
        }
        writeln!(out)?;
    }

    if !analysis.candidates_for_glacier.is_empty() {
        let mut by_savings: Vec<&TierCandidate> = analysis.candidates_for_glacier.iter().collect();
        by_savings.sort_by(|a, b| {
            b.potential_savings_monthly
                .total_cmp(&a.potential_savings_monthly)
        });

        writeln!(out, "CANDIDATES FOR GLACIER (Top {} by savings)", TOP_CANDIDATES)?;
        writeln!(out, "{}", light_rule())?;
        writeln!(out, "Total candidates: {}", analysis.candidates_for_glacier.len())?;
        writeln!(out, "Potential monthly savings: ${:.2}\n", analysis.glacier_savings_monthly())?;
        for candidate in by_savings.into_iter().take(TOP_CANDIDATES) {
            writeln!(out, "  {}", clip(&candidate.key, 70))?;
            writeln!(
                out,
                "    Size: {:.4} GB, Age: {} days, Current: {}, Savings: ${:.2}/month",
                candidate.size_gb,
                candidate.age_days,
                candidate.current_storage_class,
                candidate.potential_savings_monthly
            )?;
        }
        writeln!(out)?;
    }

    if !analysis.stale_objects.is_empty() {
        let stale_gb: f64 = analysis.stale_objects.iter().map(|o| o.size_gb).sum();
        writeln!(
            out,
            "OLD OBJECTS (>{} days, not modified recently)",
            thresholds.stale_age_days
        )?;
        writeln!(out, "{}", light_rule())?;
        writeln!(out, "Total old objects: {}", analysis.stale_objects.len())?;
        writeln!(out, "Total size: {:.2} GB", stale_gb)?;
        writeln!(out, "Review these objects for potential deletion\n")?;
    }

    writeln!(out)
}

fn write_upload(out: &mut String, upload: &WasteEntry) -> std::fmt::Result {
    writeln!(out, "  {}", clip(&upload.key, 70))?;
    if upload.size_known {
        writeln!(out, "    Age: {} days, Size: {:.4} GB", upload.age_days, upload.size_gb)?;
    } else {
        writeln!(out, "    Age: {} days, Size: unknown", upload.age_days)?;
    }
    writeln!(out, "    Upload ID: {}", upload.upload_id)
}

fn write_multipart(
    out: &mut String,
    analysis: &MultipartAnalysis,
    pricing: &PricingTable,
    thresholds: &Thresholds,
) -> std::fmt::Result {
    writeln!(out, "Bucket: {}", analysis.bucket_name)?;
    writeln!(out, "{}", light_rule())?;

    if let Some(error) = &analysis.error {
        return writeln!(out, "ERROR: {}\n", error);
    }

    writeln!(out, "Total incomplete uploads: {}", analysis.total_uploads)?;
    writeln!(
        out,
        "Old uploads (>{} days): {}",
        thresholds.multipart_age_days,
        analysis.stale_uploads.len()
    )?;
    writeln!(out, "Estimated storage: {:.2} GB", analysis.known_size_gb())?;

    if !analysis.stale_uploads.is_empty() {
        write!(
            out,
            "Estimated monthly cost: ${:.2}",
            analysis.estimated_monthly_cost(pricing)
        )?;
        if analysis.cost_is_lower_bound() {
            write!(
                out,
                " (lower bound, {} upload(s) of unknown size)",
                analysis.unknown_size_count()
            )?;
        }
        writeln!(out, "\n")?;

        let mut by_age: Vec<&WasteEntry> = analysis.stale_uploads.iter().collect();
        by_age.sort_by(|a, b| b.age_days.cmp(&a.age_days));

        writeln!(out, "Old incomplete uploads:")?;
        for upload in by_age.into_iter().take(TOP_UPLOADS) {
            write_upload(out, upload)?;
        }
    }
    writeln!(out)
}

fn write_recommendations(out: &mut String, thresholds: &Thresholds) -> std::fmt::Result {
    writeln!(out, "{}", heavy_rule())?;
    writeln!(out, "RECOMMENDATIONS")?;
    writeln!(out, "{}\n", heavy_rule())?;

    writeln!(out, "1. LIFECYCLE POLICIES")?;
    writeln!(
        out,
        "   - Create lifecycle policies to automatically transition objects to IA after {} days",
        thresholds.ia_age_days
    )?;
    writeln!(
        out,
        "   - Transition rarely accessed objects to Glacier after {} days",
        thresholds.glacier_age_days
    )?;
    writeln!(
        out,
        "   - Enable Intelligent-Tiering for objects with unpredictable access patterns\n"
    )?;

    writeln!(out, "2. MULTIPART UPLOADS")?;
    writeln!(
        out,
        "   - Abort incomplete multipart uploads older than {} days",
        thresholds.multipart_age_days
    )?;
    writeln!(out, "   - Create lifecycle policy to automatically abort incomplete uploads\n")?;

    writeln!(out, "3. DATA CLEANUP")?;
    writeln!(
        out,
        "   - Review old objects (>{} days) for potential deletion",
        thresholds.stale_age_days
    )?;
    writeln!(out, "   - Implement data retention policies\n")?;

    writeln!(out, "4. MONITORING")?;
    writeln!(out, "   - Enable S3 Storage Lens for ongoing cost monitoring")?;
    writeln!(out, "   - Set up CloudWatch metrics for bucket-level monitoring")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_document;
    use chrono::{Duration, TimeZone, Utc};
    use tierbay_engine::{MultipartUploadRecord, MultipartWasteEstimator, PartBytes};

    #[test]
    fn test_grouped_digits() {
        assert_eq!(grouped(0), "0");
        assert_eq!(grouped(999), "999");
        assert_eq!(grouped(1000), "1,000");
        assert_eq!(grouped(1234567), "1,234,567");
    }

    #[test]
    fn test_clip_counts_chars() {
        assert_eq!(clip("héllo", 2), "hé");
        assert_eq!(clip("abc", 10), "abc");
    }

    #[test]
    fn test_report_sections_in_order() {
        let text = render_text(&sample_document());

        let order = [
            "S3 COST OPTIMIZATION REPORT",
            "EXECUTIVE SUMMARY",
            "BUCKET: media",
            "STORAGE CLASS DISTRIBUTION",
            "TOP 10 PREFIXES BY SIZE",
            "CANDIDATES FOR STANDARD-IA (Top 20 by size)",
            "CANDIDATES FOR GLACIER (Top 20 by savings)",
            "OLD OBJECTS (>90 days, not modified recently)",
            "BUCKET: locked",
            "INCOMPLETE MULTIPART UPLOADS",
            "RECOMMENDATIONS",
        ];
        let mut cursor = 0;
        for heading in order {
            let found = text[cursor..]
                .find(heading)
                .unwrap_or_else(|| panic!("missing or out of order: {heading}"));
            cursor += found + heading.len();
        }

        assert!(text.contains("Buckets With Errors: 1"));
        assert!(text.contains("ERROR: AccessDenied"));
        assert!(text.contains("Total Objects: 3"));
    }

    #[test]
    fn test_ia_candidates_sorted_by_size() {
        let text = render_text(&sample_document());
        let section = &text[text.find("CANDIDATES FOR STANDARD-IA").unwrap()..];
        let big = section.find("videos/a.mp4").unwrap();
        let small = section.find("thumbs/b.png").unwrap();
        assert!(big < small);
        assert!(section.contains("Total candidates: 2"));
    }

    #[test]
    fn test_unknown_upload_sizes_are_marked() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let estimator = MultipartWasteEstimator::new(&Thresholds::default()).unwrap();
        let mut analysis = MultipartAnalysis::new("uploads");
        for (id, bytes) in [("known", PartBytes::Known(1 << 30)), ("lost", PartBytes::Unknown)] {
            let record = MultipartUploadRecord::new(id, id, now - Duration::days(14), bytes, now);
            analysis.record(estimator.evaluate(&record, now));
        }

        let mut out = String::new();
        let pricing = PricingTable::default();
        write_multipart(&mut out, &analysis, &pricing, &Thresholds::default()).unwrap();

        assert!(out.contains("Old uploads (>7 days): 2"));
        assert!(out.contains("Estimated storage: 1.00 GB"));
        assert!(out.contains(
            "Estimated monthly cost: $0.02 (lower bound, 1 upload(s) of unknown size)"
        ));
        assert!(out.contains("Size: unknown"));
        assert!(out.contains("Size: 1.0000 GB"));
    }
}
