//! Field extraction schemas for the three kinds of listing cards.
//!
//! A schema is an ordered list of fields; the order of the list is the column
//! order of the resulting dataset.

use crate::types::ListingKind;

/// Post-extraction cleanup applied on top of the border trim every field gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Keep only the digits, "5 врачей" becomes "5".
    DigitsOnly,
    /// Split on commas, trim each item and rejoin with ", ".
    CommaList,
}

/// Where a field's text lives inside a card: the first descendant element with
/// this tag whose attributes all match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    pub tag: &'static str,
    pub attrs: &'static [(&'static str, &'static str)],
}

impl Locator {
    pub const fn new(tag: &'static str, attrs: &'static [(&'static str, &'static str)]) -> Self {
        Self { tag, attrs }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub column: &'static str,
    pub locator: Locator,
    pub rule: Option<Normalization>,
}

const fn field(column: &'static str, locator: Locator) -> FieldSpec {
    FieldSpec {
        column,
        locator,
        rule: None,
    }
}

const fn field_with(column: &'static str, locator: Locator, rule: Normalization) -> FieldSpec {
    FieldSpec {
        column,
        locator,
        rule: Some(rule),
    }
}

/// Tag and class identifying one card on a listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardSelector {
    pub tag: &'static str,
    pub class: &'static str,
}

impl CardSelector {
    pub fn css(&self) -> String {
        format!("{}.{}", self.tag, self.class)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub card: CardSelector,
    pub fields: &'static [FieldSpec],
}

impl Schema {
    pub fn for_listing(kind: ListingKind) -> &'static Schema {
        match kind {
            ListingKind::Clinics => &CLINIC_SCHEMA,
            ListingKind::Doctors => &DOCTOR_SCHEMA,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.column)
    }
}

const CLINIC_CARD: CardSelector = CardSelector {
    tag: "div",
    class: "b-card__row",
};

pub static CLINIC_SCHEMA: Schema = Schema {
    card: CLINIC_CARD,
    fields: &[
        field(
            "Название",
            Locator::new("span", &[("data-qa", "lpu_card_heading_lpu_name")]),
        ),
        field(
            "Тип",
            Locator::new("div", &[("data-qa", "lpu_card_subheading_lputype_name")]),
        ),
        field_with(
            "Кол-во врачей",
            Locator::new("div", &[("data-qa", "lpu_card_subheading_doctors_count")]),
            Normalization::DigitsOnly,
        ),
        field(
            "Адрес",
            Locator::new("span", &[("data-qa", "lpu_card_btn_addr_text")]),
        ),
        field(
            "Телефон",
            Locator::new("span", &[("data-qa", "lpu_card_btn_phone_text")]),
        ),
        field(
            "Открыто до",
            Locator::new("span", &[("data-qa", "lpu_card_btn_schedule_text")]),
        ),
        field(
            "Цены",
            Locator::new("span", &[("data-qa", "lpu_card_btn_prices_num")]),
        ),
        field_with(
            "Отзывы",
            Locator::new("span", &[("data-qa", "lpu_card_stars_text")]),
            Normalization::DigitsOnly,
        ),
    ],
};

pub static DOCTOR_SCHEMA: Schema = Schema {
    card: CardSelector {
        tag: "div",
        class: "b-doctor-card",
    },
    fields: &[
        field(
            "ФИО",
            Locator::new("span", &[("class", "b-doctor-card__name-surname")]),
        ),
        field_with(
            "Специальность",
            Locator::new("div", &[("class", "b-doctor-card__spec")]),
            Normalization::CommaList,
        ),
        field(
            "Стаж",
            Locator::new("div", &[("class", "b-doctor-card__experience-years")]),
        ),
        field(
            "Категория",
            Locator::new("div", &[("class", "b-doctor-card__category")]),
        ),
        field(
            "Отзывов",
            Locator::new(
                "a",
                &[(
                    "class",
                    "ui-text ui-text_body-2 b-link b-link_prg b-link_color_grey b-link_underline",
                )],
            ),
        ),
        field(
            "Клиника",
            Locator::new("span", &[("class", "b-select__trigger-main-text")]),
        ),
        field(
            "Адрес клиники",
            Locator::new("span", &[("class", "b-select__trigger-adit-text")]),
        ),
    ],
};

pub static SERVICE_SCHEMA: Schema = Schema {
    card: CLINIC_CARD,
    fields: &[
        field(
            "Название",
            Locator::new("span", &[("data-qa", "lpu_card_heading_lpu_name")]),
        ),
        field(
            "Адрес",
            Locator::new("span", &[("data-qa", "lpu_card_btn_addr_text")]),
        ),
        field(
            "Телефон",
            Locator::new("span", &[("data-qa", "lpu_card_btn_phone_text")]),
        ),
        field(
            "Открыто до",
            Locator::new("span", &[("data-qa", "lpu_card_btn_schedule_text")]),
        ),
        field(
            "Кнопка",
            Locator::new("span", &[("class", "ui-text ui-text_button")]),
        ),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_columns_are_unique() {
        for schema in [&CLINIC_SCHEMA, &DOCTOR_SCHEMA, &SERVICE_SCHEMA] {
            let mut columns: Vec<_> = schema.columns().collect();
            let total = columns.len();
            columns.sort_unstable();
            columns.dedup();
            assert_eq!(columns.len(), total);
        }
    }

    #[test]
    fn test_service_schema_is_keyed_by_name() {
        assert_eq!(SERVICE_SCHEMA.columns().next(), Some(crate::NAME_COLUMN));
        assert!(SERVICE_SCHEMA.columns().any(|c| c == crate::ADDRESS_COLUMN));
    }

    #[test]
    fn test_card_css() {
        assert_eq!(
            Schema::for_listing(ListingKind::Doctors).card.css(),
            "div.b-doctor-card"
        );
        assert_eq!(CLINIC_SCHEMA.card.css(), "div.b-card__row");
    }
}
