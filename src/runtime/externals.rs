//! The host function surface the contract imports under `env`.
//!
//! Every function charges gas before performing work; crossing the limit
//! aborts the call with a gas-exceeded trap.

use tracing::debug;
use wasmi::{Externals, RuntimeArgs, RuntimeValue, Trap};

use super::args::Args;
use super::cryptography;
use super::function_index::FunctionIndex;
use super::{pack_iterator_handle, unpack_iterator_handle, RuntimeEnvironment};
use crate::backend::{BackendError, Order, Record};
use crate::execution::Error;
use crate::memory::{decode_sections, encode_sections};

impl<'a> Externals for RuntimeEnvironment<'a> {
    fn invoke_index(
        &mut self,
        index: usize,
        args: RuntimeArgs,
    ) -> Result<Option<RuntimeValue>, Trap> {
        let func = FunctionIndex::try_from(index).map_err(|unknown| {
            Trap::from(Error::Interpreter(format!(
                "unknown host function index {}",
                unknown
            )))
        })?;

        match func {
            FunctionIndex::DbRead => {
                // args(0) = pointer to key Region
                let (key_ptr,) = Args::parse(&args)?;
                let ret = self.db_read(key_ptr)?;
                Ok(Some(RuntimeValue::I32(ret as i32)))
            }

            FunctionIndex::DbWrite => {
                // args(0) = pointer to key Region
                // args(1) = pointer to value Region
                let (key_ptr, value_ptr) = Args::parse(&args)?;
                self.db_write(key_ptr, value_ptr)?;
                Ok(None)
            }

            FunctionIndex::DbRemove => {
                let (key_ptr,) = Args::parse(&args)?;
                self.db_remove(key_ptr)?;
                Ok(None)
            }

            FunctionIndex::DbScan => {
                // args(0) = start bound Region pointer, 0 or empty = unbounded
                // args(1) = end bound Region pointer, 0 or empty = unbounded
                // args(2) = order, 1 ascending / 2 descending
                let (start_ptr, end_ptr, order) = Args::parse(&args)?;
                let handle = self.db_scan(start_ptr, end_ptr, order)?;
                Ok(Some(RuntimeValue::I32(handle as i32)))
            }

            FunctionIndex::DbNext => {
                let (handle,) = Args::parse(&args)?;
                let ret = self.db_next(handle)?;
                Ok(Some(RuntimeValue::I32(ret as i32)))
            }

            FunctionIndex::AddrValidate => {
                let (human_ptr,) = Args::parse(&args)?;
                let ret = self.addr_validate(human_ptr)?;
                Ok(Some(RuntimeValue::I32(ret as i32)))
            }

            FunctionIndex::AddrCanonicalize => {
                let (human_ptr,) = Args::parse(&args)?;
                let ret = self.addr_canonicalize(human_ptr)?;
                Ok(Some(RuntimeValue::I32(ret as i32)))
            }

            FunctionIndex::AddrHumanize => {
                let (canonical_ptr,) = Args::parse(&args)?;
                let ret = self.addr_humanize(canonical_ptr)?;
                Ok(Some(RuntimeValue::I32(ret as i32)))
            }

            FunctionIndex::QueryChain => {
                let (request_ptr,) = Args::parse(&args)?;
                let ret = self.query_chain(request_ptr)?;
                Ok(Some(RuntimeValue::I32(ret as i32)))
            }

            FunctionIndex::Secp256k1Verify => {
                // args = message hash, signature, public key Region pointers
                let (hash_ptr, sig_ptr, pubkey_ptr) = Args::parse(&args)?;
                let code = self.secp256k1_verify(hash_ptr, sig_ptr, pubkey_ptr)?;
                Ok(Some(RuntimeValue::I32(code as i32)))
            }

            FunctionIndex::Secp256k1RecoverPubkey => {
                // args(2) = recovery parameter, 0 or 1
                let (hash_ptr, sig_ptr, param) = Args::parse(&args)?;
                let ret = self.secp256k1_recover_pubkey(hash_ptr, sig_ptr, param)?;
                Ok(Some(RuntimeValue::I32(ret as i32)))
            }

            FunctionIndex::Ed25519Verify => {
                let (msg_ptr, sig_ptr, pubkey_ptr) = Args::parse(&args)?;
                let code = self.ed25519_verify(msg_ptr, sig_ptr, pubkey_ptr)?;
                Ok(Some(RuntimeValue::I32(code as i32)))
            }

            FunctionIndex::Ed25519BatchVerify => {
                // args = section-encoded messages, signatures, public keys
                let (msgs_ptr, sigs_ptr, pubkeys_ptr) = Args::parse(&args)?;
                let code = self.ed25519_batch_verify(msgs_ptr, sigs_ptr, pubkeys_ptr)?;
                Ok(Some(RuntimeValue::I32(code as i32)))
            }

            FunctionIndex::Abort => {
                let (msg_ptr,) = Args::parse(&args)?;
                Err(self.abort(msg_ptr))
            }

            FunctionIndex::Debug => {
                let (msg_ptr,) = Args::parse(&args)?;
                self.print_debug(msg_ptr)?;
                Ok(None)
            }
        }
    }
}

impl<'a> RuntimeEnvironment<'a> {
    fn db_read(&mut self, key_ptr: u32) -> Result<u32, Error> {
        let mem = self.memory()?;
        let key = mem.read_from_memory(key_ptr)?;
        self.charge_gas(self.costs.db_read + self.costs.per_byte * key.len() as u64)?;
        let value = match self.storage.get(&key)? {
            Some(value) => value,
            None => return Ok(0),
        };
        self.charge_gas(self.costs.per_byte * value.len() as u64)?;
        mem.write_to_memory(&value, self)
    }

    fn db_write(&mut self, key_ptr: u32, value_ptr: u32) -> Result<(), Error> {
        let mem = self.memory()?;
        let key = mem.read_from_memory(key_ptr)?;
        let value = mem.read_from_memory(value_ptr)?;
        self.charge_gas(
            self.costs.db_write + self.costs.per_byte * (key.len() + value.len()) as u64,
        )?;
        self.storage.set(&key, &value)?;
        Ok(())
    }

    fn db_remove(&mut self, key_ptr: u32) -> Result<(), Error> {
        let mem = self.memory()?;
        let key = mem.read_from_memory(key_ptr)?;
        self.charge_gas(self.costs.db_remove + self.costs.per_byte * key.len() as u64)?;
        self.storage.remove(&key)?;
        Ok(())
    }

    fn db_scan(&mut self, start_ptr: u32, end_ptr: u32, order: i32) -> Result<u32, Error> {
        let mem = self.memory()?;
        let start = self.read_optional_bound(&mem, start_ptr)?;
        let end = self.read_optional_bound(&mem, end_ptr)?;
        let order = Order::try_from(order).map_err(Error::InvalidOrder)?;
        self.charge_gas(self.costs.db_scan)?;
        let iterator = self.storage.scan(start.as_deref(), end.as_deref(), order)?;
        let call_id = self.call_id();
        let iter_id = self.iterators.add(call_id, iterator);
        Ok(pack_iterator_handle(call_id, iter_id))
    }

    fn read_optional_bound(
        &self,
        mem: &crate::memory::MemoryManager,
        ptr: u32,
    ) -> Result<Option<Vec<u8>>, Error> {
        if ptr == 0 {
            return Ok(None);
        }
        let bound = mem.read_from_memory(ptr)?;
        Ok(if bound.is_empty() { None } else { Some(bound) })
    }

    fn db_next(&mut self, handle: u32) -> Result<u32, Error> {
        self.charge_gas(self.costs.db_next)?;
        let (call_bits, iter_id) = unpack_iterator_handle(handle);
        let call_id = self.call_id();
        if call_bits != (call_id as u32 & 0xffff) {
            return Err(Error::IteratorNotFound(handle));
        }
        let record = {
            let iterator = self
                .iterators
                .get_mut(call_id, iter_id)
                .ok_or(Error::IteratorNotFound(handle))?;
            iterator.next_record()?
        };
        let mem = self.memory()?;
        match record {
            Some(Record { key, value }) => {
                self.charge_gas(self.costs.per_byte * (key.len() + value.len()) as u64)?;
                let payload = encode_sections(&[&key, &value]);
                mem.write_to_memory(&payload, self)
            }
            // Exhausted: hand back an empty Region.
            None => mem.write_to_memory(&[], self),
        }
    }

    fn addr_validate(&mut self, human_ptr: u32) -> Result<u32, Error> {
        let mem = self.memory()?;
        let bytes = mem.read_from_memory(human_ptr)?;
        self.charge_gas(self.costs.addr_validate + self.costs.per_byte * bytes.len() as u64)?;
        let human = match std::str::from_utf8(&bytes) {
            Ok(human) => human,
            Err(_) => return mem.write_to_memory(b"input is not valid UTF-8", self),
        };
        match self.api.validate_address(human) {
            Ok(()) => Ok(0),
            Err(e) => {
                let message = e.to_string();
                mem.write_to_memory(message.as_bytes(), self)
            }
        }
    }

    fn addr_canonicalize(&mut self, human_ptr: u32) -> Result<u32, Error> {
        let mem = self.memory()?;
        let bytes = mem.read_from_memory(human_ptr)?;
        self.charge_gas(self.costs.addr_canonicalize + self.costs.per_byte * bytes.len() as u64)?;
        let human = std::str::from_utf8(&bytes)
            .map_err(|_| BackendError::InvalidAddress("input is not valid UTF-8".to_string()))?;
        let canonical = self.api.canonicalize_address(human)?;
        mem.write_to_memory(&canonical, self)
    }

    fn addr_humanize(&mut self, canonical_ptr: u32) -> Result<u32, Error> {
        let mem = self.memory()?;
        let canonical = mem.read_from_memory(canonical_ptr)?;
        self.charge_gas(self.costs.addr_humanize + self.costs.per_byte * canonical.len() as u64)?;
        let human = self.api.humanize_address(&canonical)?;
        mem.write_to_memory(human.as_bytes(), self)
    }

    fn query_chain(&mut self, request_ptr: u32) -> Result<u32, Error> {
        let mem = self.memory()?;
        let request = mem.read_from_memory(request_ptr)?;
        self.charge_gas(self.costs.query_chain + self.costs.per_byte * request.len() as u64)?;
        // The querier runs under whatever gas is left for this call.
        let sub_limit = self.remaining_gas();
        let response = self.querier.query_raw(&request, sub_limit)?;
        self.charge_gas(self.costs.per_byte * response.len() as u64)?;
        mem.write_to_memory(&response, self)
    }

    fn secp256k1_verify(
        &mut self,
        hash_ptr: u32,
        sig_ptr: u32,
        pubkey_ptr: u32,
    ) -> Result<u32, Error> {
        let mem = self.memory()?;
        let hash = mem.read_from_memory(hash_ptr)?;
        let signature = mem.read_from_memory(sig_ptr)?;
        let public_key = mem.read_from_memory(pubkey_ptr)?;
        self.charge_gas(self.costs.secp256k1_verify)?;
        Ok(
            match cryptography::secp256k1_verify(&hash, &signature, &public_key) {
                Ok(true) => 0,
                Ok(false) => 1,
                Err(e) => e.code(),
            },
        )
    }

    fn secp256k1_recover_pubkey(
        &mut self,
        hash_ptr: u32,
        sig_ptr: u32,
        recovery_param: u32,
    ) -> Result<u32, Error> {
        let mem = self.memory()?;
        let hash = mem.read_from_memory(hash_ptr)?;
        let signature = mem.read_from_memory(sig_ptr)?;
        self.charge_gas(self.costs.secp256k1_recover_pubkey)?;
        let param = u8::try_from(recovery_param)
            .map_err(|_| Error::Crypto(cryptography::CryptoError::InvalidRecoveryParam))?;
        let public_key = cryptography::secp256k1_recover_pubkey(&hash, &signature, param)?;
        mem.write_to_memory(&public_key, self)
    }

    fn ed25519_verify(
        &mut self,
        msg_ptr: u32,
        sig_ptr: u32,
        pubkey_ptr: u32,
    ) -> Result<u32, Error> {
        let mem = self.memory()?;
        let message = mem.read_from_memory(msg_ptr)?;
        let signature = mem.read_from_memory(sig_ptr)?;
        let public_key = mem.read_from_memory(pubkey_ptr)?;
        self.charge_gas(self.costs.ed25519_verify)?;
        Ok(
            match cryptography::ed25519_verify(&message, &signature, &public_key) {
                Ok(true) => 0,
                Ok(false) => 1,
                Err(e) => e.code(),
            },
        )
    }

    fn ed25519_batch_verify(
        &mut self,
        msgs_ptr: u32,
        sigs_ptr: u32,
        pubkeys_ptr: u32,
    ) -> Result<u32, Error> {
        let mem = self.memory()?;
        let messages = decode_sections(&mem.read_from_memory(msgs_ptr)?)?;
        let signatures = decode_sections(&mem.read_from_memory(sigs_ptr)?)?;
        let public_keys = decode_sections(&mem.read_from_memory(pubkeys_ptr)?)?;
        self.charge_gas(
            self.costs.ed25519_batch_verify_base
                + self.costs.ed25519_batch_verify_per_item * signatures.len() as u64,
        )?;
        Ok(
            match cryptography::ed25519_batch_verify(&messages, &signatures, &public_keys) {
                Ok(true) => 0,
                Ok(false) => 1,
                Err(e) => e.code(),
            },
        )
    }

    fn abort(&mut self, msg_ptr: u32) -> Trap {
        let message = match self.memory().and_then(|mem| mem.read_from_memory(msg_ptr)) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => "contract aborted without a readable message".to_string(),
        };
        Error::Aborted(message).into()
    }

    fn print_debug(&mut self, msg_ptr: u32) -> Result<(), Error> {
        // Best effort, no gas charge worth metering.
        let mem = self.memory()?;
        let bytes = mem.read_from_memory(msg_ptr)?;
        debug!(
            call_id = self.call_id(),
            message = %String::from_utf8_lossy(&bytes),
            "contract debug"
        );
        Ok(())
    }
}
