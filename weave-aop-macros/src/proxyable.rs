//! #[proxyable] 宏实现
//!
//! 生成三部分：
//! - `impl Proxyable`：运行时类型描述，方法体把 `Value` 参数转换后调用原方法
//! - `inventory` 注册，让 `Class::of` 能认出该类型的对象
//! - `<Type>Proxy` 门面：同名方法，经过代理分派

use crate::utils::{has_attr, is_str_ref, is_unit, result_ok_type, strip_attr};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::spanned::Spanned;
use syn::{
    Error, FnArg, Ident, ImplItem, ImplItemFn, ItemImpl, LitStr, Pat, Result, ReturnType, Token,
    Type, Visibility,
};

const FINAL_ATTR: &str = "proxy_final";

/// `#[proxyable(name = "...")]` 的参数
pub struct ProxyableArgs {
    name: Option<LitStr>,
}

impl Parse for ProxyableArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        if input.is_empty() {
            return Ok(Self { name: None });
        }
        let key: Ident = input.parse()?;
        if key != "name" {
            return Err(Error::new(key.span(), "expected `name = \"...\"`"));
        }
        input.parse::<Token![=]>()?;
        let name: LitStr = input.parse()?;
        Ok(Self { name: Some(name) })
    }
}

struct Param {
    ident: Ident,
    /// 从 `Value` 取出的类型
    owned: Type,
    /// 原参数是 `&str`
    borrowed: bool,
}

enum Output {
    Unit,
    Value(Type),
    Result(Type),
}

struct ProxiedMethod {
    ident: Ident,
    is_final: bool,
    params: Vec<Param>,
    output: Output,
}

pub fn impl_proxyable(args: ProxyableArgs, mut item: ItemImpl) -> Result<TokenStream> {
    if let Some((_, path, _)) = &item.trait_ {
        return Err(Error::new_spanned(path, "#[proxyable] must be applied to an inherent impl block"));
    }
    if !item.generics.params.is_empty() {
        return Err(Error::new_spanned(&item.generics, "#[proxyable] does not support generic types"));
    }

    let self_ty = item.self_ty.as_ref().clone();
    let type_ident = match &self_ty {
        Type::Path(p) if p.qself.is_none() => match p.path.segments.last() {
            Some(segment) => segment.ident.clone(),
            None => return Err(Error::new_spanned(&self_ty, "expected a type path")),
        },
        other => return Err(Error::new_spanned(other, "#[proxyable] requires a named type")),
    };
    let class_name = args
        .name
        .map(|lit| lit.value())
        .unwrap_or_else(|| type_ident.to_string());

    let mut methods = Vec::new();
    for impl_item in item.items.iter_mut() {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        if let Some(proxied) = analyze_method(method)? {
            methods.push(proxied);
        }
        strip_attr(&mut method.attrs, FINAL_ATTR);
    }

    let class_methods = methods.iter().map(|m| class_method(&self_ty, &class_name, m));
    let facade_ident = format_ident!("{}Proxy", type_ident);
    let facade_methods = methods.iter().map(|m| facade_method(&class_name, m));
    let facade_doc = format!("`{}` 的类型化代理门面", class_name);

    Ok(quote! {
        #item

        impl ::weave_aop::Proxyable for #self_ty {
            fn class() -> ::weave_aop::Class {
                static CLASS: ::weave_aop::once_cell::sync::Lazy<::weave_aop::Class> =
                    ::weave_aop::once_cell::sync::Lazy::new(|| {
                        ::weave_aop::ClassBuilder::<#self_ty>::new(#class_name)
                            #(#class_methods)*
                            .build()
                    });
                ::std::clone::Clone::clone(&*CLASS)
            }
        }

        ::weave_aop::inventory::submit! {
            ::weave_aop::ClassRegistration::new(
                #class_name,
                <#self_ty as ::weave_aop::Proxyable>::class,
            )
        }

        #[doc = #facade_doc]
        #[derive(Clone, Debug)]
        pub struct #facade_ident {
            proxy: ::weave_aop::Proxy,
        }

        impl #facade_ident {
            pub fn new(proxy: ::weave_aop::Proxy) -> Self {
                Self { proxy }
            }

            /// 对象是代理时包装成门面
            pub fn from_object(object: &::weave_aop::Object) -> ::std::option::Option<Self> {
                ::weave_aop::Proxy::from_object(object).map(Self::new)
            }

            /// 用代理工厂创建代理
            pub fn from_factory(
                factory: &::weave_aop::ProxyFactory,
            ) -> ::weave_aop::AopResult<Self> {
                factory.get_proxy().map(Self::new)
            }

            pub fn proxy(&self) -> &::weave_aop::Proxy {
                &self.proxy
            }

            pub fn into_proxy(self) -> ::weave_aop::Proxy {
                self.proxy
            }

            #(#facade_methods)*
        }

        impl ::std::convert::From<::weave_aop::Proxy> for #facade_ident {
            fn from(proxy: ::weave_aop::Proxy) -> Self {
                Self::new(proxy)
            }
        }
    })
}

/// 只处理带 `&self` 的 `pub fn`；其余方法原样保留
fn analyze_method(method: &ImplItemFn) -> Result<Option<ProxiedMethod>> {
    if !matches!(method.vis, Visibility::Public(_)) {
        return Ok(None);
    }
    let sig = &method.sig;
    let Some(FnArg::Receiver(receiver)) = sig.inputs.first() else {
        return Ok(None);
    };
    if receiver.reference.is_none() || receiver.mutability.is_some() {
        return Err(Error::new(receiver.span(), "#[proxyable] methods must take `&self`"));
    }
    if let Some(asyncness) = &sig.asyncness {
        return Err(Error::new(asyncness.span(), "#[proxyable] does not support async methods"));
    }
    if !sig.generics.params.is_empty() {
        return Err(Error::new_spanned(&sig.generics, "#[proxyable] does not support generic methods"));
    }

    let mut params = Vec::new();
    for (index, input) in sig.inputs.iter().skip(1).enumerate() {
        let FnArg::Typed(pat_type) = input else {
            continue;
        };
        let ident = match &*pat_type.pat {
            Pat::Ident(pat) => pat.ident.clone(),
            _ => format_ident!("arg{}", index),
        };
        let ty = pat_type.ty.as_ref();
        let param = if is_str_ref(ty) {
            Param {
                ident,
                owned: syn::parse_quote!(::std::string::String),
                borrowed: true,
            }
        } else if matches!(ty, Type::Reference(_)) {
            return Err(Error::new_spanned(ty, "#[proxyable] parameters must be passed by value (or as &str)"));
        } else {
            Param {
                ident,
                owned: ty.clone(),
                borrowed: false,
            }
        };
        params.push(param);
    }

    let output = match &sig.output {
        ReturnType::Default => Output::Unit,
        ReturnType::Type(_, ty) if is_unit(ty) => Output::Unit,
        ReturnType::Type(_, ty) => match result_ok_type(ty) {
            Some(ok) => Output::Result(ok.clone()),
            None => Output::Value(ty.as_ref().clone()),
        },
    };

    Ok(Some(ProxiedMethod {
        ident: sig.ident.clone(),
        is_final: has_attr(&method.attrs, FINAL_ATTR),
        params,
        output,
    }))
}

fn return_type_tokens(output: &Output) -> TokenStream {
    match output {
        Output::Unit => quote!(::weave_aop::ValueType::Void),
        Output::Value(ty) | Output::Result(ty) => quote!(<#ty as ::weave_aop::IntoValue>::value_type()),
    }
}

/// 类型描述里的一个方法
fn class_method(self_ty: &Type, class_name: &str, method: &ProxiedMethod) -> TokenStream {
    let ident = &method.ident;
    let name = ident.to_string();
    let label = format!("{}::{}", class_name, name);
    let builder = if method.is_final {
        quote!(final_method)
    } else {
        quote!(method)
    };

    let param_types = method.params.iter().map(|p| {
        let owned = &p.owned;
        quote!(<#owned as ::weave_aop::IntoValue>::value_type())
    });
    let return_type = return_type_tokens(&method.output);

    let locals: Vec<Ident> = (0..method.params.len()).map(|i| format_ident!("arg{}", i)).collect();
    let bindings = method.params.iter().zip(&locals).enumerate().map(|(index, (p, local))| {
        let owned = &p.owned;
        quote!(let #local: #owned = ::weave_aop::arg(args, #index, #label)?;)
    });
    let call_args = method.params.iter().zip(&locals).map(|(p, local)| {
        if p.borrowed {
            quote!(&#local)
        } else {
            quote!(#local)
        }
    });
    let call = quote!(this.#ident(#(#call_args),*));

    let body = match &method.output {
        Output::Unit => quote! {
            #call;
            ::std::result::Result::Ok(::weave_aop::Value::Unit)
        },
        Output::Value(_) => quote! {
            ::std::result::Result::Ok(::weave_aop::IntoValue::into_value(#call))
        },
        Output::Result(_) => quote! {
            match #call {
                ::std::result::Result::Ok(value) => {
                    ::std::result::Result::Ok(::weave_aop::IntoValue::into_value(value))
                }
                ::std::result::Result::Err(error) => {
                    ::std::result::Result::Err(::weave_aop::InvocationError::thrown(error))
                }
            }
        },
    };
    let args_pat = if method.params.is_empty() {
        quote!(_)
    } else {
        quote!(args)
    };

    quote! {
        .#builder(
            #name,
            vec![#(#param_types),*],
            #return_type,
            |this: &#self_ty, #args_pat: &[::weave_aop::Value]| -> ::weave_aop::InvocationResult<::weave_aop::Value> {
                #(#bindings)*
                #body
            },
        )
    }
}

/// 门面上的同名方法
fn facade_method(class_name: &str, method: &ProxiedMethod) -> TokenStream {
    let ident = &method.ident;
    let name = ident.to_string();
    let label = format!("{}::{}", class_name, name);

    let params = method.params.iter().map(|p| {
        let param = &p.ident;
        if p.borrowed {
            quote!(#param: &str)
        } else {
            let owned = &p.owned;
            quote!(#param: #owned)
        }
    });
    let values = method.params.iter().map(|p| {
        let param = &p.ident;
        if p.borrowed {
            quote!(::weave_aop::Value::Str(::std::string::ToString::to_string(#param)))
        } else {
            quote!(::weave_aop::IntoValue::into_value(#param))
        }
    });
    let ok_type = match &method.output {
        Output::Unit => quote!(()),
        Output::Value(ty) | Output::Result(ty) => quote!(#ty),
    };

    quote! {
        pub fn #ident(&self, #(#params),*) -> ::std::result::Result<#ok_type, ::weave_aop::InvocationError> {
            let value = self.proxy.invoke_named(#name, vec![#(#values),*])?;
            <#ok_type as ::weave_aop::FromValue>::from_value(&value).ok_or_else(|| {
                ::weave_aop::InvocationError::type_mismatch(
                    #label,
                    ::std::format!("return value of type {}", ::std::any::type_name::<#ok_type>()),
                )
            })
        }
    }
}
