//! Typed chemical-composition record.
//!
//! # Responsibility
//! - Name every tracked element explicitly instead of building column lists
//!   per query.
//! - Own the "copy only into empty fields" inheritance primitive.
//!
//! # Invariants
//! - A blank value is never stored: setters normalize `""` to `None`.
//! - `fill_from` never overwrites a populated field.

use serde::{Deserialize, Serialize};

/// Tracked composition element, in storage column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Carbon,
    Chromium,
    Nickel,
    Molybdenum,
    Vanadium,
    Tungsten,
    Cobalt,
    Manganese,
    Silicon,
    Sulfur,
    Phosphorus,
    Copper,
    Niobium,
    Nitrogen,
    /// Free-text remainder for elements without a dedicated column.
    Other,
}

impl Element {
    /// Every element, in storage column order.
    pub const ALL: [Element; 15] = [
        Element::Carbon,
        Element::Chromium,
        Element::Nickel,
        Element::Molybdenum,
        Element::Vanadium,
        Element::Tungsten,
        Element::Cobalt,
        Element::Manganese,
        Element::Silicon,
        Element::Sulfur,
        Element::Phosphorus,
        Element::Copper,
        Element::Niobium,
        Element::Nitrogen,
        Element::Other,
    ];

    /// Elements whose presence qualifies a record as a chemistry donor.
    pub const KEY: [Element; 4] = [
        Element::Carbon,
        Element::Chromium,
        Element::Nickel,
        Element::Molybdenum,
    ];

    /// SQLite column backing this element.
    pub fn column(self) -> &'static str {
        match self {
            Self::Carbon => "c",
            Self::Chromium => "cr",
            Self::Nickel => "ni",
            Self::Molybdenum => "mo",
            Self::Vanadium => "v",
            Self::Tungsten => "w",
            Self::Cobalt => "co",
            Self::Manganese => "mn",
            Self::Silicon => "si",
            Self::Sulfur => "s",
            Self::Phosphorus => "p",
            Self::Copper => "cu",
            Self::Niobium => "nb",
            Self::Nitrogen => "n",
            Self::Other => "other_elements",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Carbon => "C",
            Self::Chromium => "Cr",
            Self::Nickel => "Ni",
            Self::Molybdenum => "Mo",
            Self::Vanadium => "V",
            Self::Tungsten => "W",
            Self::Cobalt => "Co",
            Self::Manganese => "Mn",
            Self::Silicon => "Si",
            Self::Sulfur => "S",
            Self::Phosphorus => "P",
            Self::Copper => "Cu",
            Self::Niobium => "Nb",
            Self::Nitrogen => "N",
            Self::Other => "other",
        }
    }
}

/// Sparse per-element composition. Values are kept as text because sources
/// publish ranges (`"0.40-0.50"`) as often as single numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composition {
    pub carbon: Option<String>,
    pub chromium: Option<String>,
    pub nickel: Option<String>,
    pub molybdenum: Option<String>,
    pub vanadium: Option<String>,
    pub tungsten: Option<String>,
    pub cobalt: Option<String>,
    pub manganese: Option<String>,
    pub silicon: Option<String>,
    pub sulfur: Option<String>,
    pub phosphorus: Option<String>,
    pub copper: Option<String>,
    pub niobium: Option<String>,
    pub nitrogen: Option<String>,
    pub other: Option<String>,
}

impl Composition {
    /// Returns the populated value for `element`, if any.
    pub fn get(&self, element: Element) -> Option<&str> {
        self.slot(element).as_deref()
    }

    /// Sets `element`, normalizing blank text to `None`.
    pub fn set(&mut self, element: Element, value: Option<String>) {
        *self.slot_mut(element) = normalize_value(value);
    }

    /// Builder-style variant of [`Composition::set`].
    pub fn with(mut self, element: Element, value: impl Into<String>) -> Self {
        self.set(element, Some(value.into()));
        self
    }

    pub fn is_set(&self, element: Element) -> bool {
        self.get(element).is_some()
    }

    /// True when at least one of C/Cr/Ni/Mo is populated.
    pub fn has_key_elements(&self) -> bool {
        Element::KEY.iter().any(|element| self.is_set(*element))
    }

    pub fn is_empty(&self) -> bool {
        Element::ALL.iter().all(|element| !self.is_set(*element))
    }

    /// Copies every populated donor field into the matching empty field of
    /// `self` and returns the elements that were copied.
    pub fn fill_from(&mut self, donor: &Composition) -> Vec<Element> {
        let mut copied = Vec::new();
        for element in Element::ALL {
            if self.is_set(element) {
                continue;
            }
            if let Some(value) = donor.get(element) {
                self.set(element, Some(value.to_string()));
                copied.push(element);
            }
        }
        copied
    }

    fn slot(&self, element: Element) -> &Option<String> {
        match element {
            Element::Carbon => &self.carbon,
            Element::Chromium => &self.chromium,
            Element::Nickel => &self.nickel,
            Element::Molybdenum => &self.molybdenum,
            Element::Vanadium => &self.vanadium,
            Element::Tungsten => &self.tungsten,
            Element::Cobalt => &self.cobalt,
            Element::Manganese => &self.manganese,
            Element::Silicon => &self.silicon,
            Element::Sulfur => &self.sulfur,
            Element::Phosphorus => &self.phosphorus,
            Element::Copper => &self.copper,
            Element::Niobium => &self.niobium,
            Element::Nitrogen => &self.nitrogen,
            Element::Other => &self.other,
        }
    }

    fn slot_mut(&mut self, element: Element) -> &mut Option<String> {
        match element {
            Element::Carbon => &mut self.carbon,
            Element::Chromium => &mut self.chromium,
            Element::Nickel => &mut self.nickel,
            Element::Molybdenum => &mut self.molybdenum,
            Element::Vanadium => &mut self.vanadium,
            Element::Tungsten => &mut self.tungsten,
            Element::Cobalt => &mut self.cobalt,
            Element::Manganese => &mut self.manganese,
            Element::Silicon => &mut self.silicon,
            Element::Sulfur => &mut self.sulfur,
            Element::Phosphorus => &mut self.phosphorus,
            Element::Copper => &mut self.copper,
            Element::Niobium => &mut self.niobium,
            Element::Nitrogen => &mut self.nitrogen,
            Element::Other => &mut self.other,
        }
    }
}

fn normalize_value(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
