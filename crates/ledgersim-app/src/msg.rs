//! Transactions and the messages they carry.

use ledgersim_types::{Address, Amount};
use serde::{Deserialize, Serialize};

use crate::gov::{ProposalContent, VoteOption};

/// Fee paid by the transaction signer, plus the gas it claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Amount,
    pub gas: u64,
}

impl Fee {
    pub fn new(amount: Amount, gas: u64) -> Self {
        Self { amount, gas }
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Msg {
    Send {
        from: Address,
        to: Address,
        amount: Amount,
    },
    MultiSend {
        inputs: Vec<(Address, Amount)>,
        outputs: Vec<(Address, Amount)>,
    },
    CreateValidator {
        operator: Address,
        self_delegation: Amount,
        commission_bps: u32,
        moniker: String,
    },
    EditValidator {
        operator: Address,
        commission_bps: Option<u32>,
        moniker: Option<String>,
    },
    Delegate {
        delegator: Address,
        validator: Address,
        amount: Amount,
    },
    Undelegate {
        delegator: Address,
        validator: Address,
        shares: u64,
    },
    BeginRedelegate {
        delegator: Address,
        src: Address,
        dst: Address,
        shares: u64,
    },
    Unjail {
        operator: Address,
    },
    SetWithdrawAddress {
        delegator: Address,
        withdraw_to: Address,
    },
    WithdrawDelegatorReward {
        delegator: Address,
        validator: Address,
    },
    WithdrawValidatorCommission {
        operator: Address,
    },
    SubmitProposal {
        proposer: Address,
        content: ProposalContent,
        initial_deposit: Amount,
    },
    Deposit {
        proposal_id: u64,
        depositor: Address,
        amount: Amount,
    },
    Vote {
        proposal_id: u64,
        voter: Address,
        option: VoteOption,
    },
}

impl Msg {
    /// Account that must sign for this message.
    pub fn signer(&self) -> Option<Address> {
        match self {
            Msg::Send { from, .. } => Some(*from),
            Msg::MultiSend { inputs, .. } => inputs.first().map(|(a, _)| *a),
            Msg::CreateValidator { operator, .. }
            | Msg::EditValidator { operator, .. }
            | Msg::Unjail { operator }
            | Msg::WithdrawValidatorCommission { operator } => Some(*operator),
            Msg::Delegate { delegator, .. }
            | Msg::Undelegate { delegator, .. }
            | Msg::BeginRedelegate { delegator, .. }
            | Msg::SetWithdrawAddress { delegator, .. }
            | Msg::WithdrawDelegatorReward { delegator, .. } => Some(*delegator),
            Msg::SubmitProposal { proposer, .. } => Some(*proposer),
            Msg::Deposit { depositor, .. } => Some(*depositor),
            Msg::Vote { voter, .. } => Some(*voter),
        }
    }

    /// Every account whose funds the message moves must sign; multisend
    /// inputs beyond the first are not supported.
    pub fn is_single_signer(&self) -> bool {
        match self {
            Msg::MultiSend { inputs, .. } => inputs.len() == 1,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub signer: Address,
    pub fee: Fee,
    pub msgs: Vec<Msg>,
}

impl Tx {
    pub fn new(signer: Address, fee: Fee, msgs: Vec<Msg>) -> Self {
        Self { signer, fee, msgs }
    }

    pub fn single(signer: Address, fee: Fee, msg: Msg) -> Self {
        Self::new(signer, fee, vec![msg])
    }
}

/// What a delivered transaction produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxResponse {
    /// Id of a proposal the transaction submitted.
    pub proposal_id: Option<u64>,
    pub messages: usize,
}
