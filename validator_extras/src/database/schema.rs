// Tables written by chaind. Only the columns read here are declared.

diesel::table! {
    t_validators (f_index) {
        f_index -> Int8,
        f_public_key -> Bytea,
        f_activation_epoch -> Nullable<Int8>,
        f_exit_epoch -> Nullable<Int8>,
        f_slashed -> Bool,
    }
}

diesel::table! {
    t_epoch_summaries (f_epoch) {
        f_epoch -> Int8,
        f_active_balance -> Int8,
        f_attesting_balance -> Int8,
        f_target_correct_balance -> Int8,
        f_head_correct_balance -> Int8,
    }
}

diesel::table! {
    t_blocks (f_root) {
        f_root -> Bytea,
        f_slot -> Int8,
        f_canonical -> Nullable<Bool>,
    }
}

diesel::table! {
    t_validator_epoch_summaries (f_validator_index, f_epoch) {
        f_validator_index -> Int8,
        f_epoch -> Int8,
        f_proposer_duties -> Int4,
        f_proposals_included -> Int4,
        f_attestation_included -> Bool,
        f_attestation_target_correct -> Nullable<Bool>,
        f_attestation_head_correct -> Nullable<Bool>,
        f_attestation_inclusion_delay -> Nullable<Int4>,
    }
}

diesel::table! {
    t_beacon_committees (f_slot, f_index) {
        f_slot -> Int8,
        f_index -> Int8,
        f_committee -> Array<Int8>,
    }
}

diesel::table! {
    t_proposer_duties (f_slot) {
        f_slot -> Int8,
        f_validator_index -> Int8,
    }
}

diesel::table! {
    t_validator_balances (f_validator_index, f_epoch) {
        f_validator_index -> Int8,
        f_epoch -> Int8,
        f_balance -> Int8,
        f_effective_balance -> Int8,
    }
}

// Written by this crate, see `migrations/`.

diesel::table! {
    t_validator_epoch_extras (f_validator_index, f_epoch) {
        f_epoch -> Int8,
        f_validator_index -> Int8,
        f_attestation_slot -> Nullable<Int8>,
        f_attestation_reward -> Int8,
        f_max_attestation_reward -> Int8,
        f_shortfall_missed -> Int8,
        f_shortfall_target -> Int8,
        f_shortfall_head -> Int8,
        f_shortfall_delay -> Int8,
        f_block_reward -> Int8,
        f_missed_block_reward -> Int8,
    }
}
