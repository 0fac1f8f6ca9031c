use super::engine::CommissionEngine;
use crate::domain::band::{Band, BandSpec, Range};
use crate::domain::context::OperationContext;
use crate::domain::rule::{CommissionMethod, Rule};
use crate::domain::salesperson::SalespersonConfig;
use crate::domain::{BandId, CompanyId, RangeId, RuleId, UserId};
use crate::error::{CommissionError, Result};
use tracing::info;

impl CommissionEngine {
    pub async fn register_band(&self, ctx: &OperationContext, spec: BandSpec) -> Result<Band> {
        if spec.company != ctx.company {
            return Err(CommissionError::validation(format!(
                "Band '{}' belongs to company {}, not {}",
                spec.code, spec.company, ctx.company
            )));
        }
        let band = Band::new(spec)?;
        self.ports.bands.insert(band.clone()).await?;
        info!(band = %band.display_name(), ranges = band.ranges().len(), "commission band registered");
        Ok(band)
    }

    pub async fn band(&self, ctx: &OperationContext, id: BandId) -> Result<Band> {
        self.ports
            .bands
            .get(id)
            .await?
            .filter(|b| b.company() == ctx.company)
            .ok_or_else(|| CommissionError::not_found(format!("band {}", id)))
    }

    pub async fn replace_band_ranges(&self, ctx: &OperationContext, id: BandId, ranges: Vec<Range>) -> Result<Band> {
        let mut band = self.band(ctx, id).await?;
        band.replace_ranges(ranges)?;
        self.ports.bands.update(band.clone()).await?;
        Ok(band)
    }

    pub async fn add_band_range(&self, ctx: &OperationContext, id: BandId, range: Range) -> Result<Band> {
        let mut band = self.band(ctx, id).await?;
        band.add_range(range)?;
        self.ports.bands.update(band.clone()).await?;
        Ok(band)
    }

    pub async fn remove_band_range(&self, ctx: &OperationContext, id: BandId, range: RangeId) -> Result<Band> {
        let mut band = self.band(ctx, id).await?;
        band.remove_range(range)?;
        self.ports.bands.update(band.clone()).await?;
        Ok(band)
    }

    pub async fn set_band_active(&self, ctx: &OperationContext, id: BandId, active: bool) -> Result<Band> {
        let mut band = self.band(ctx, id).await?;
        if active {
            band.activate();
        } else {
            band.deactivate();
        }
        self.ports.bands.update(band.clone()).await?;
        Ok(band)
    }

    async fn check_method(&self, company: CompanyId, method: &CommissionMethod) -> Result<()> {
        method.validate()?;
        if let CommissionMethod::Band { band } = method {
            let known = self
                .ports
                .bands
                .get(*band)
                .await?
                .is_some_and(|b| b.company() == company);
            if !known {
                return Err(CommissionError::configuration(format!(
                    "Commission band {} does not exist in company {}",
                    band, company
                )));
            }
        }
        Ok(())
    }

    pub async fn register_rule(&self, ctx: &OperationContext, rule: Rule) -> Result<Rule> {
        if rule.company != ctx.company {
            return Err(CommissionError::validation(format!(
                "Rule '{}' belongs to company {}, not {}",
                rule.code, rule.company, ctx.company
            )));
        }
        rule.validate()?;
        self.check_method(rule.company, &rule.method).await?;
        self.ports.rules.insert(rule.clone()).await?;
        info!(rule = %rule.code, method = rule.method.kind(), "commission rule registered");
        Ok(rule)
    }

    pub async fn update_rule(&self, ctx: &OperationContext, rule: Rule) -> Result<Rule> {
        let existing = self.rule(ctx, rule.id).await?;
        if existing.company != rule.company {
            return Err(CommissionError::validation("A rule cannot move between companies"));
        }
        rule.validate()?;
        self.check_method(rule.company, &rule.method).await?;
        self.ports.rules.update(rule.clone()).await?;
        Ok(rule)
    }

    pub async fn rule(&self, ctx: &OperationContext, id: RuleId) -> Result<Rule> {
        self.ports
            .rules
            .get(id)
            .await?
            .filter(|r| r.company == ctx.company)
            .ok_or_else(|| CommissionError::not_found(format!("rule {}", id)))
    }

    /// Refused with `Conflict` while any calculation refers to the rule;
    /// deactivate it instead.
    pub async fn delete_rule(&self, ctx: &OperationContext, id: RuleId) -> Result<()> {
        let rule = self.rule(ctx, id).await?;
        if self.ports.calculations.exists_for_rule(rule.id).await? {
            return Err(CommissionError::conflict(format!(
                "Rule '{}' is used by commission calculations and cannot be deleted",
                rule.code
            )));
        }
        self.ports.rules.delete(rule.id).await?;
        info!(rule = %rule.code, "commission rule deleted");
        Ok(())
    }

    pub async fn save_salesperson_config(&self, ctx: &OperationContext, config: SalespersonConfig) -> Result<SalespersonConfig> {
        if config.company != ctx.company {
            return Err(CommissionError::validation(format!(
                "Configuration of salesperson {} belongs to company {}, not {}",
                config.salesperson, config.company, ctx.company
            )));
        }
        config.validate()?;
        self.check_method(config.company, &config.override_method).await?;
        if let Some(rule) = config.default_rule {
            self.rule(ctx, rule).await.map_err(|_| {
                CommissionError::configuration(format!(
                    "Default rule {} does not exist in company {}",
                    rule, config.company
                ))
            })?;
        }
        self.ports.configs.upsert(config.clone()).await?;
        Ok(config)
    }

    pub async fn salesperson_config(&self, ctx: &OperationContext, salesperson: UserId) -> Result<Option<SalespersonConfig>> {
        self.ports.configs.get(salesperson, ctx.company).await
    }
}
