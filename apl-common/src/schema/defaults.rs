//! Compiled-in default schema
//!
//! Used when the configuration file defines no `[[fields]]` table.

use super::{names, CategoryDescriptor, FieldDescriptor, FieldType};

/// Default paper fields, in storage order
pub fn default_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new(names::DOI, FieldType::String, 0)
            .stored_as("DOI")
            .displayed_as("DOI")
            .immutable()
            .shown(),
        FieldDescriptor::new(names::TITLE, FieldType::String, 1)
            .stored_as("Title")
            .displayed_as("Title")
            .required()
            .shown(),
        FieldDescriptor::new(names::AUTHORS, FieldType::String, 2)
            .stored_as("Authors")
            .displayed_as("Authors")
            .shown(),
        FieldDescriptor::new(names::DATE, FieldType::String, 3)
            .stored_as("Date")
            .displayed_as("Publication Date")
            .shown(),
        FieldDescriptor::new(names::CATEGORY, FieldType::Enum, 4)
            .stored_as("Category")
            .displayed_as("Category")
            .required(),
        FieldDescriptor::new("venue", FieldType::String, 5)
            .stored_as("Venue")
            .displayed_as("Venue")
            .shown(),
        FieldDescriptor::new(names::PAPER_URL, FieldType::String, 6)
            .stored_as("Paper URL")
            .displayed_as("Paper")
            .shown(),
        FieldDescriptor::new(names::PROJECT_URL, FieldType::String, 7)
            .stored_as("Project URL")
            .displayed_as("Project")
            .shown(),
        FieldDescriptor::new("summary_motivation", FieldType::Text, 8)
            .stored_as("Motivation")
            .displayed_as("Motivation"),
        FieldDescriptor::new("summary_innovation", FieldType::Text, 9)
            .stored_as("Innovation")
            .displayed_as("Innovation"),
        FieldDescriptor::new("summary_method", FieldType::Text, 10)
            .stored_as("Method")
            .displayed_as("Method"),
        FieldDescriptor::new("summary_conclusion", FieldType::Text, 11)
            .stored_as("Conclusion")
            .displayed_as("Conclusion"),
        FieldDescriptor::new("summary_limitation", FieldType::Text, 12)
            .stored_as("Limitation")
            .displayed_as("Limitation"),
        FieldDescriptor::new("notes", FieldType::Text, 13)
            .stored_as("Notes")
            .displayed_as("Notes")
            .disabled(),
        FieldDescriptor::new(names::CONTRIBUTOR, FieldType::String, 14)
            .stored_as("Contributor")
            .displayed_as("Contributor")
            .immutable(),
        FieldDescriptor::new(names::SUBMISSION_TIME, FieldType::String, 15)
            .stored_as("Submission Time")
            .displayed_as("Submission Time")
            .immutable(),
        FieldDescriptor::new(names::CONFLICT_MARKER, FieldType::Bool, 16)
            .stored_as("Conflict")
            .displayed_as("Conflict")
            .immutable(),
        FieldDescriptor::new(names::SHOW_IN_OUTPUT, FieldType::Bool, 17)
            .stored_as("Show In Output")
            .displayed_as("Show In Output")
            .immutable(),
        FieldDescriptor::new(names::STATUS, FieldType::String, 18)
            .stored_as("Status")
            .displayed_as("Status"),
    ]
}

/// Default categories
pub fn default_categories() -> Vec<CategoryDescriptor> {
    vec![
        CategoryDescriptor::primary("survey", "Surveys", 0),
        CategoryDescriptor::primary("method", "Methods", 1),
        CategoryDescriptor::child("method-generation", "Generation", 2, "method"),
        CategoryDescriptor::child("method-understanding", "Understanding", 3, "method"),
        CategoryDescriptor::child("method-efficiency", "Efficiency", 4, "method"),
        CategoryDescriptor::primary("benchmark", "Datasets & Benchmarks", 5),
        CategoryDescriptor::primary("application", "Applications", 6),
        CategoryDescriptor::primary("other", "Others", 7),
    ]
}
