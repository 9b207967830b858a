use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ethers::types::{H256, U256};
use tracing::{debug, warn};

use crate::events::{Deposit, Fill, Swap};
use crate::provider::Provider;
use crate::relays::{RelayEvents, RelayHashInfo};
use crate::ChainId;

use super::{get_integrator_id, PriceError, PriceSource, TokenPrice, TokenRef};

/// Attaches USD economics and the integrator id to relay aggregates.
///
/// Enrichment is best effort: failures are logged and leave fields unset,
/// never affecting status.
#[derive(Clone, Default)]
pub struct Enricher {
    price_source: Option<Arc<dyn PriceSource>>,
    providers: HashMap<ChainId, Arc<dyn Provider>>,
}

impl Enricher {
    pub fn new(
        price_source: Option<Arc<dyn PriceSource>>,
        providers: HashMap<ChainId, Arc<dyn Provider>>,
    ) -> Self {
        Self {
            price_source,
            providers,
        }
    }

    pub fn has_price_source(&self) -> bool {
        self.price_source.is_some()
    }

    pub async fn enrich(&self, info: &mut RelayHashInfo, events: &RelayEvents) {
        let Some((deposit_event, deposit)) = events.latest_deposit() else {
            return;
        };

        if info.integrator_id.is_none() {
            let origin_chain_id = info.get_origin_chain_id();
            info.integrator_id = self
                .get_deposit_integrator_id(origin_chain_id, &deposit_event.transaction_hash)
                .await;
        }

        let Some(price_source) = &self.price_source else {
            return;
        };

        let economics = Economics {
            price_source: price_source.as_ref(),
            at: deposit.quoted_at(),
        };
        let fill = events.latest_fill().map(|(_event, fill)| fill);
        let swap = events.swap_before(deposit_event);

        if let Err(error) = economics.apply(info, &deposit, fill.as_ref(), swap.as_ref()).await {
            warn!(relay_hash = %info.relay_hash, %error, "Could not price relay");
        }
    }

    async fn get_deposit_integrator_id(
        &self,
        origin_chain_id: ChainId,
        transaction_hash: &str,
    ) -> Option<String> {
        let provider = self.providers.get(&origin_chain_id)?;
        let hash = H256::from_str(transaction_hash).ok()?;

        match provider.get_transaction_data(hash).await {
            Ok(calldata) => get_integrator_id(&calldata),
            Err(error) => {
                debug!(
                    origin_chain_id,
                    transaction_hash,
                    %error,
                    "Could not load deposit calldata"
                );
                None
            }
        }
    }
}

struct Economics<'a> {
    price_source: &'a dyn PriceSource,
    at: DateTime<Utc>,
}

impl Economics<'_> {
    async fn apply(
        &self,
        info: &mut RelayHashInfo,
        deposit: &Deposit,
        fill: Option<&Fill>,
        swap: Option<&Swap>,
    ) -> Result<(), PriceError> {
        let relay_data = &deposit.relay_data;
        let origin_chain_id = relay_data.origin_chain_id;
        let destination_chain_id = relay_data.destination_chain_id;

        let input_token = TokenRef::Erc20(relay_data.input_token);
        let output_token = TokenRef::Erc20(relay_data.output_token);
        let input_price = self.get_price(origin_chain_id, input_token).await?;
        let output_price = self.get_price(destination_chain_id, output_token).await?;

        let (Some(input_price), Some(output_price)) = (input_price, output_price) else {
            return Ok(());
        };

        info.bridge_fee_usd = Some(
            input_price.value_usd(relay_data.input_amount)?
                - output_price.value_usd(relay_data.output_amount)?,
        );

        info.gas_fee_usd = match fill.and_then(|fill| fill.gas_cost_wei) {
            Some(gas_cost_wei) => {
                self.get_value_usd(destination_chain_id, TokenRef::Native, gas_cost_wei)
                    .await?
            }
            None => None,
        };

        if let Some(swap) = swap {
            let swap_token = TokenRef::Erc20(swap.swap_token);
            let swap_token_price = self.get_price(origin_chain_id, swap_token).await?;
            let acx_input_price = if swap.acx_input_token == relay_data.input_token {
                Some(input_price)
            } else {
                let acx_input_token = TokenRef::Erc20(swap.acx_input_token);
                self.get_price(origin_chain_id, acx_input_token).await?
            };

            if let (Some(swap_token_price), Some(acx_input_price)) =
                (swap_token_price, acx_input_price)
            {
                info.swap_token_price_usd = Some(swap_token_price.price_usd);
                info.swap_fee_usd = Some(
                    swap_token_price.value_usd(swap.swap_token_amount)?
                        - acx_input_price.value_usd(swap.acx_input_amount)?,
                );
            }
        }

        info.input_price_usd = Some(input_price.price_usd);
        info.output_price_usd = Some(output_price.price_usd);

        Ok(())
    }

    async fn get_price(
        &self,
        chain_id: ChainId,
        token: TokenRef,
    ) -> Result<Option<TokenPrice>, PriceError> {
        self.price_source.get_price(chain_id, &token, self.at).await
    }

    async fn get_value_usd(
        &self,
        chain_id: ChainId,
        token: TokenRef,
        amount: U256,
    ) -> Result<Option<f64>, PriceError> {
        match self.get_price(chain_id, token).await? {
            Some(price) => Ok(Some(price.value_usd(amount)?)),
            None => Ok(None),
        }
    }
}
