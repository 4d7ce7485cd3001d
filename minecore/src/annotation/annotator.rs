use std::collections::HashSet;

use tracing::{debug, info};

use crate::annotation::filter::CompoundFilter;
use crate::data::adduct::{AdductRule, AdductTable, Polarity};
use crate::data::peak::Peak;
use crate::error::Result;
use crate::params::{MassTolerance, SearchParams};
use crate::store::{CompoundStore, MassQuery};

/// Annotates peaks with candidate compounds from a store, one mass window per adduct.
pub struct PeakAnnotator<'a, S: CompoundStore + ?Sized> {
    store: &'a S,
    tolerance: MassTolerance,
    filter: CompoundFilter,
    native_ids: &'a HashSet<String>,
    verbose: bool,
}

impl<'a, S: CompoundStore + ?Sized> PeakAnnotator<'a, S> {
    pub fn new(store: &'a S, params: &SearchParams, native_ids: &'a HashSet<String>) -> Self {
        PeakAnnotator {
            store,
            tolerance: params.mass_tolerance(),
            filter: params.compound_filter(),
            native_ids,
            verbose: params.verbose,
        }
    }

    /// Store query for one peak m/z under one adduct.
    ///
    /// The window is centred on the candidate neutral mass and its half-width is
    /// computed from that mass.
    pub fn mass_query(&self, mz: f64, rule: &AdductRule) -> MassQuery {
        let mass = rule.neutral_mass(mz);
        let window = self.tolerance.window(mass);
        MassQuery {
            min_mass: mass - window,
            max_mass: mass + window,
            charge: rule.required_charge(),
            logp_range: self.filter.logp_range,
            kovats_range: self.filter.kovats_range,
        }
    }

    /// Queries the store once per adduct and records every surviving candidate on the peak.
    pub fn find_db_hits(&self, peak: &mut Peak, adducts: &AdductTable) -> Result<()> {
        for rule in adducts.iter() {
            let query = self.mass_query(peak.mz, rule);
            let candidates = self.store.find_by_mass(&query)?;
            let found = candidates.len();

            let kept = self.filter.filter(candidates);
            for compound in &kept {
                let native = self.native_ids.contains(&compound.id);
                peak.record_hit(compound, &rule.name, native);
            }
            let kept = kept.len();

            if self.verbose {
                info!(peak = %peak.name, adduct = %rule.name, lower = query.min_mass, upper = query.max_mass, found, kept, "adduct query");
            } else {
                debug!(peak = %peak.name, adduct = %rule.name, lower = query.min_mass, upper = query.max_mass, found, kept, "adduct query");
            }
        }
        Ok(())
    }

    /// Annotates a peak with the table matching its polarity.
    pub fn annotate(&self, peak: &mut Peak, positive: &AdductTable, negative: &AdductTable) -> Result<()> {
        match peak.polarity {
            Polarity::Positive => self.find_db_hits(peak, positive),
            Polarity::Negative => self.find_db_hits(peak, negative),
        }
    }
}
